//! エラー型とエラーメッセージ定数

use crate::watchpoint::WatchpointId;
use hinoki_target::{MemoryError, Word};
use thiserror::Error;

/// 履歴が空の状態で `p` を引数なしで実行した場合のエラーメッセージ
pub const ERR_HISTORY_EMPTY: &str = "The history is empty.";

/// 終了したプログラムを実行しようとした場合のエラーメッセージ
pub const ERR_PROGRAM_ENDED: &str =
    "Program execution has ended. To restart the program, exit hinoki and run again.";

/// 式の字句解析・評価エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    /// どの字句規則にもマッチしない、または字句が長すぎる
    #[error("no match at position {position}")]
    Lex { position: usize },
    /// トークン数が上限を超えた
    #[error("expression has more than {limit} tokens")]
    TokenLimitExceeded { limit: usize },
    /// 構文エラー
    #[error("A syntax error in expression: {reason}")]
    Syntax { reason: String },
    /// 整数リテラルが64ビットに収まらない
    #[error("Numeric constant too large: {literal}")]
    NumericOverflow { literal: String },
    /// 存在しないレジスタ
    #[error("Invalid register ${name}")]
    InvalidRegister { name: String },
    /// ゼロ除算
    #[error("Divide by zero.")]
    DivisionByZero,
    /// 括弧の対応が取れていない
    #[error("Unmatched brackets in expression.")]
    UnmatchedParenthesis,
    /// 参照外しで物理メモリ外を読もうとした
    #[error("Cannot access memory at address 0x{address:08x}")]
    MemoryAccess {
        address: Word,
        #[source]
        source: MemoryError,
    },
}

impl ExprError {
    /// 構文エラーを作成する
    pub fn syntax(reason: impl Into<String>) -> Self {
        ExprError::Syntax { reason: reason.into() }
    }
}

/// ウォッチポイントプールのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchpointError {
    /// 空きスロットがない
    #[error("The watchpoint pool is full ({capacity} watchpoints).")]
    PoolExhausted { capacity: usize },
    /// 指定されたIDのウォッチポイントが存在しない
    #[error("No watchpoint number {id}.")]
    UnknownWatchpointId { id: WatchpointId },
    /// 割り当て可能なウォッチポイント番号を使い切った
    #[error("No more watchpoint numbers are available.")]
    IdsExhausted,
    /// 式の評価に失敗したためウォッチポイントを作成できない
    #[error(transparent)]
    Expression(#[from] ExprError),
}

/// コマンドラインのパースエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// 未知のコマンド
    #[error("Unknown command \"{0}\".")]
    UnknownCommand(String),
    /// 必須の引数がない
    #[error("{0}")]
    MissingArgument(&'static str),
    /// 数値として解釈できない
    #[error("Invalid number \"{0}\".")]
    InvalidNumber(String),
    /// 余分な引数がある
    #[error("Ambiguous {command} command \"{args}\".")]
    Ambiguous { command: &'static str, args: String },
    /// 未知の info サブコマンド
    #[error("Ambiguous info command \"{0}\".")]
    UnknownInfoSubcommand(String),
    /// x コマンドの個数が0
    #[error("The number of bytes to examine must be greater than 0.")]
    ZeroCount,
}
