//! 式評価エンジン
//!
//! デバッガで使用する式を評価します（`p`、`x`、`w` コマンド等）。
//! 最も結合の弱い演算子（主演算子）で範囲を分割し、左右を再帰的に評価します。

use crate::errors::ExprError;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::parse::parse_integer;
use hinoki_target::{PhysicalMemory, RegisterLookup, Word, WORD_BITS};
use tracing::debug;

/// 参照外しで読み取るバイト数
const DEREF_WIDTH: usize = 4;

/// 残りスタックがこれを下回ったらスタックを拡張する（100KB）
const RED_ZONE: usize = 100 * 1024;

/// 1回の拡張で確保するスタック（1MB）
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// 深い再帰の前に十分なスタックを確保する
///
/// 再帰の深さは演算子の数と括弧のネストに比例するため、
/// トークン数上限近くの式でもスタックオーバーフローしないように拡張します。
#[inline]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// 式評価器
///
/// レジスタとメモリへのアクセスは外部から注入されます。
pub struct ExpressionEvaluator<'a> {
    registers: &'a dyn RegisterLookup,
    memory: &'a dyn PhysicalMemory,
}

impl<'a> ExpressionEvaluator<'a> {
    /// 新しい式評価器を作成する
    pub fn new(registers: &'a dyn RegisterLookup, memory: &'a dyn PhysicalMemory) -> Self {
        Self { registers, memory }
    }

    /// レジスタとメモリの両方を提供するターゲットから式評価器を作成する
    pub fn for_target<T: RegisterLookup + PhysicalMemory>(target: &'a T) -> Self {
        Self::new(target, target)
    }

    /// 文字列の式を評価する
    pub fn evaluate_str(&self, source: &str) -> Result<Word, ExprError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::syntax("empty expression"));
        }
        self.evaluate(&tokens, 0, tokens.len() - 1)
    }

    /// トークン列の範囲 `[p, q]` を評価する
    pub fn evaluate(&self, tokens: &[Token], p: usize, q: usize) -> Result<Word, ExprError> {
        if p > q || q >= tokens.len() {
            return Err(ExprError::syntax(format!("bad range [{}, {}]", p, q)));
        }
        self.eval_range(&tokens[p..=q])
    }

    fn eval_range(&self, tokens: &[Token]) -> Result<Word, ExprError> {
        ensure_sufficient_stack(|| self.eval_range_inner(tokens))
    }

    fn eval_range_inner(&self, tokens: &[Token]) -> Result<Word, ExprError> {
        match tokens {
            [] => Err(ExprError::syntax("missing operand")),
            [token] => self.eval_operand(token),
            [op, operand] => {
                if !op.kind.is_unary() {
                    return Err(ExprError::syntax(format!(
                        "unexpected '{}' before '{}'",
                        op.lexeme, operand.lexeme
                    )));
                }
                let value = self.eval_operand(operand)?;
                self.apply_unary(op.kind, value)
            }
            _ if is_wrapped(tokens) => self.eval_range(&tokens[1..tokens.len() - 1]),
            _ => match find_main_operator(tokens)? {
                Some(pos) => {
                    let op = tokens[pos].kind;
                    debug!("main operator '{}' at {}", tokens[pos].lexeme, pos);

                    // 短絡評価は行わない: 両辺を常に評価する
                    let lhs = self.eval_range(&tokens[..pos])?;
                    let rhs = self.eval_range(&tokens[pos + 1..])?;
                    apply_binary(op, lhs, rhs)
                }
                // 単項演算子 + 括弧で囲まれたグループ
                None if tokens[0].kind.is_unary() && is_wrapped(&tokens[1..]) => {
                    let value = self.eval_range(&tokens[2..tokens.len() - 1])?;
                    self.apply_unary(tokens[0].kind, value)
                }
                None => Err(ExprError::syntax("no operator found")),
            },
        }
    }

    /// 単一トークン（整数リテラルまたはレジスタ）を評価する
    fn eval_operand(&self, token: &Token) -> Result<Word, ExprError> {
        match token.kind {
            // ワード幅に切り詰める
            TokenKind::Int => parse_integer(&token.lexeme).map(|v| v as Word),
            TokenKind::Reg => {
                let name = token.lexeme.trim_start_matches('$');
                // $0 はゼロレジスタ
                if name == "0" {
                    return Ok(0);
                }
                self.registers
                    .lookup(name)
                    .ok_or_else(|| ExprError::InvalidRegister { name: name.to_string() })
            }
            _ => Err(ExprError::syntax(format!("unexpected '{}'", token.lexeme))),
        }
    }

    fn apply_unary(&self, op: TokenKind, value: Word) -> Result<Word, ExprError> {
        match op {
            TokenKind::BitNot => Ok(!value),
            TokenKind::LogicalNot => Ok((value == 0) as Word),
            TokenKind::Deref => self
                .memory
                .read(value, DEREF_WIDTH)
                .map_err(|source| ExprError::MemoryAccess { address: value, source }),
            _ => Err(ExprError::syntax(format!("{:?} is not a unary operator", op))),
        }
    }
}

/// 範囲全体が1組の対応する括弧で囲まれているか
fn is_wrapped(tokens: &[Token]) -> bool {
    if tokens.len() < 2 || tokens[0].kind != TokenKind::LParen {
        return false;
    }

    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth == 0 {
                    return i == tokens.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// 主演算子の位置を探す
///
/// 括弧の深さ0にある二項演算子のうち優先順位が最も低いものを選び、
/// 同順位なら最も右のものを選ぶ（左結合）。
fn find_main_operator(tokens: &[Token]) -> Result<Option<usize>, ExprError> {
    let mut depth = 0i64;
    let mut best: Option<(usize, u8)> = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err(ExprError::UnmatchedParenthesis);
                }
            }
            kind => {
                if let (0, Some(prec)) = (depth, kind.precedence()) {
                    if best.map_or(true, |(_, best_prec)| prec <= best_prec) {
                        best = Some((i, prec));
                    }
                }
            }
        }
    }

    if depth != 0 {
        return Err(ExprError::UnmatchedParenthesis);
    }
    Ok(best.map(|(pos, _)| pos))
}

/// 二項演算を適用する
fn apply_binary(op: TokenKind, lhs: Word, rhs: Word) -> Result<Word, ExprError> {
    use TokenKind::*;
    let value = match op {
        LogicalOr => (lhs != 0 || rhs != 0) as Word,
        LogicalAnd => (lhs != 0 && rhs != 0) as Word,
        BitOr => lhs | rhs,
        BitXor => lhs ^ rhs,
        BitAnd => lhs & rhs,
        Eq => (lhs == rhs) as Word,
        Neq => (lhs != rhs) as Word,
        Le => (lhs <= rhs) as Word,
        Ge => (lhs >= rhs) as Word,
        Lt => (lhs < rhs) as Word,
        Gt => (lhs > rhs) as Word,
        // ワード幅以上のシフトは0
        Shl if rhs >= WORD_BITS => 0,
        Shr if rhs >= WORD_BITS => 0,
        Shl => lhs << rhs,
        Shr => lhs >> rhs,
        Add => lhs.wrapping_add(rhs),
        Sub => lhs.wrapping_sub(rhs),
        Mul => lhs.wrapping_mul(rhs),
        Div => lhs.checked_div(rhs).ok_or(ExprError::DivisionByZero)?,
        Mod => lhs.checked_rem(rhs).ok_or(ExprError::DivisionByZero)?,
        // 優先順位を持つトークンのみがここに到達する
        _ => unreachable!("{:?} has no binary semantics", op),
    };
    Ok(value)
}
