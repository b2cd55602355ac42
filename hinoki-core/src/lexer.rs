//! 式の字句解析
//!
//! 順序付きの字句規則を現在位置から順に試し、最初にマッチした規則を採用します。
//! 最長一致ではないため、規則の並び順がそのまま優先順位になります
//! （`<=` は `<` より前に置く必要があります）。

use crate::errors::ExprError;
use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// 1つの式に含められるトークン数の上限
pub const MAX_TOKENS: usize = 65536;

/// 1つのトークンの字句の最大長（バイト）
pub const MAX_LEXEME_LEN: usize = 31;

/// トークンの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// 整数リテラル（10進・8進・16進、`u`サフィックス可）
    Int,
    /// レジスタ参照: `$a0`
    Reg,
    LParen,
    RParen,
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Neq,
    Le,
    Ge,
    Lt,
    Gt,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitNot,
    LogicalNot,
    /// 参照外し（字句解析後の再分類でのみ生成される）
    Deref,
}

impl TokenKind {
    /// 二項演算子の優先順位（1が最も弱く、10が最も強い）
    ///
    /// 二項演算子でなければ `None` を返します。
    pub fn precedence(self) -> Option<u8> {
        use TokenKind::*;
        match self {
            LogicalOr => Some(1),
            LogicalAnd => Some(2),
            BitOr => Some(3),
            BitXor => Some(4),
            BitAnd => Some(5),
            Eq | Neq => Some(6),
            Le | Ge | Lt | Gt => Some(7),
            Shl | Shr => Some(8),
            Add | Sub => Some(9),
            Mul | Div | Mod => Some(10),
            _ => None,
        }
    }

    /// 単項演算子かどうか
    pub fn is_unary(self) -> bool {
        matches!(self, TokenKind::BitNot | TokenKind::LogicalNot | TokenKind::Deref)
    }

    /// オペランドの終端になり得るトークンかどうか
    pub fn ends_operand(self) -> bool {
        matches!(self, TokenKind::Int | TokenKind::Reg | TokenKind::RParen)
    }
}

/// トークン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// マッチしたソーステキスト
    pub lexeme: String,
}

impl Token {
    /// 新しいトークンを作成する
    pub fn new(kind: TokenKind, lexeme: impl Into<String>) -> Self {
        Self { kind, lexeme: lexeme.into() }
    }
}

/// 字句規則。`kind` が `None` の規則は空白で、トークンを生成しない
struct Rule {
    pattern: Regex,
    kind: Option<TokenKind>,
}

/// 字句規則の一覧（宣言順に試す）
const RULES: &[(&str, Option<TokenKind>)] = &[
    (r"\s+", None),
    (r"0[xX][0-9a-fA-F]+[uU]?", Some(TokenKind::Int)),
    (r"[0-9]+[uU]?", Some(TokenKind::Int)),
    (r"\$[a-zA-Z0-9_]+", Some(TokenKind::Reg)),
    (r"\(", Some(TokenKind::LParen)),
    (r"\)", Some(TokenKind::RParen)),
    (r"\|\|", Some(TokenKind::LogicalOr)),
    (r"&&", Some(TokenKind::LogicalAnd)),
    (r"==", Some(TokenKind::Eq)),
    (r"!=", Some(TokenKind::Neq)),
    (r"<=", Some(TokenKind::Le)),
    (r">=", Some(TokenKind::Ge)),
    (r"<<", Some(TokenKind::Shl)),
    (r">>", Some(TokenKind::Shr)),
    (r"<", Some(TokenKind::Lt)),
    (r">", Some(TokenKind::Gt)),
    (r"\|", Some(TokenKind::BitOr)),
    (r"\^", Some(TokenKind::BitXor)),
    (r"&", Some(TokenKind::BitAnd)),
    (r"\+", Some(TokenKind::Add)),
    (r"-", Some(TokenKind::Sub)),
    (r"\*", Some(TokenKind::Mul)),
    (r"/", Some(TokenKind::Div)),
    (r"%", Some(TokenKind::Mod)),
    (r"~", Some(TokenKind::BitNot)),
    (r"!", Some(TokenKind::LogicalNot)),
];

/// 字句解析器
pub struct Lexer {
    rules: Vec<Rule>,
    max_tokens: usize,
}

impl Lexer {
    /// 字句解析器を作成する
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_max_tokens(MAX_TOKENS)
    }

    /// トークン数の上限を指定して字句解析器を作成する
    pub fn with_max_tokens(max_tokens: usize) -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(|(pattern, kind)| {
                // 現在位置からのマッチのみを許可する
                let pattern = Regex::new(&format!("^(?:{})", pattern))?;
                Ok::<_, regex::Error>(Rule { pattern, kind: *kind })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self { rules, max_tokens })
    }

    /// 文字列をトークン列に変換する
    ///
    /// 文字単位の走査は文脈自由で、`*` の参照外しへの再分類は
    /// 走査完了後に [`mark_dereferences`] で行います。
    pub fn tokenize(&self, source: &str) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        let mut position = 0;

        while position < source.len() {
            let rest = &source[position..];
            let (rule, len) = self
                .rules
                .iter()
                .find_map(|rule| rule.pattern.find(rest).map(|m| (rule, m.end())))
                .ok_or(ExprError::Lex { position })?;

            if let Some(kind) = rule.kind {
                // 長すぎる字句はその開始位置での字句エラー
                if len > MAX_LEXEME_LEN {
                    return Err(ExprError::Lex { position });
                }
                if tokens.len() >= self.max_tokens {
                    return Err(ExprError::TokenLimitExceeded { limit: self.max_tokens });
                }
                trace!("token {:?} at {}: {}", kind, position, &rest[..len]);
                tokens.push(Token::new(kind, &rest[..len]));
            }

            position += len;
        }

        mark_dereferences(&mut tokens);
        Ok(tokens)
    }
}

/// 共有の字句解析器で文字列をトークン列に変換する
pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    static LEXER: OnceLock<Lexer> = OnceLock::new();
    // 規則は静的な正規表現なのでコンパイルに失敗しない
    LEXER
        .get_or_init(|| Lexer::new().expect("token rules must compile"))
        .tokenize(source)
}

/// `*` を文脈に応じて参照外しに再分類する
///
/// 直前のトークンがオペランドの終端（整数、レジスタ、`)`）である場合のみ
/// 乗算のまま残し、それ以外（先頭を含む）は参照外しとします。
pub fn mark_dereferences(tokens: &mut [Token]) {
    for i in 0..tokens.len() {
        if tokens[i].kind != TokenKind::Mul {
            continue;
        }
        let after_operand = i > 0 && tokens[i - 1].kind.ends_operand();
        if !after_operand {
            tokens[i].kind = TokenKind::Deref;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_skips_whitespace() {
        let tokens = tokenize("  1 +\t0x1fU ").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new(TokenKind::Int, "1"),
                Token::new(TokenKind::Add, "+"),
                Token::new(TokenKind::Int, "0x1fU"),
            ]
        );
    }

    #[test]
    fn test_two_char_operators_win() {
        use TokenKind::*;
        assert_eq!(kinds("1<=2"), vec![Int, Le, Int]);
        assert_eq!(kinds("1<<2"), vec![Int, Shl, Int]);
        assert_eq!(kinds("1!=2"), vec![Int, Neq, Int]);
        assert_eq!(kinds("1||2&&3"), vec![Int, LogicalOr, Int, LogicalAnd, Int]);
        assert_eq!(kinds("1|2&3"), vec![Int, BitOr, Int, BitAnd, Int]);
        assert_eq!(kinds("!1 < ~2"), vec![LogicalNot, Int, Lt, BitNot, Int]);
    }

    #[test]
    fn test_hex_before_decimal() {
        let tokens = tokenize("0x10").unwrap();
        assert_eq!(tokens, vec![Token::new(TokenKind::Int, "0x10")]);
    }

    #[test]
    fn test_register_tokens() {
        let tokens = tokenize("$a0 + $0").unwrap();
        assert_eq!(tokens[0], Token::new(TokenKind::Reg, "$a0"));
        assert_eq!(tokens[2], Token::new(TokenKind::Reg, "$0"));
    }

    #[test]
    fn test_lex_error_position() {
        assert_eq!(tokenize("1 + @"), Err(ExprError::Lex { position: 4 }));
        assert_eq!(tokenize("12abc"), Err(ExprError::Lex { position: 2 }));
    }

    #[test]
    fn test_token_too_long() {
        let source = format!("${}", "r".repeat(40));
        assert_eq!(tokenize(&source), Err(ExprError::Lex { position: 0 }));

        let source = format!("1 + {}", "7".repeat(32));
        assert_eq!(tokenize(&source), Err(ExprError::Lex { position: 4 }));

        // 31バイトちょうどは受け付ける
        let source = format!("${}", "r".repeat(30));
        assert_eq!(tokenize(&source).unwrap().len(), 1);
    }

    #[test]
    fn test_token_limit() {
        let lexer = Lexer::with_max_tokens(3).unwrap();
        assert!(lexer.tokenize("1+2").is_ok());
        assert_eq!(
            lexer.tokenize("1+2+3"),
            Err(ExprError::TokenLimitExceeded { limit: 3 })
        );
        // 空白はトークン数に含まれない
        assert!(lexer.tokenize("  1  +  2  ").is_ok());
    }

    #[test]
    fn test_deref_reclassification() {
        use TokenKind::*;
        assert_eq!(kinds("*4"), vec![Deref, Int]);
        assert_eq!(kinds("4*2"), vec![Int, Mul, Int]);
        assert_eq!(kinds("$sp * *$sp"), vec![Reg, Mul, Deref, Reg]);
        assert_eq!(kinds("(1)*2"), vec![LParen, Int, RParen, Mul, Int]);
        assert_eq!(kinds("(*2)"), vec![LParen, Deref, Int, RParen]);
        assert_eq!(kinds("1+*2"), vec![Int, Add, Deref, Int]);
    }

    #[test]
    fn test_empty_source() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
