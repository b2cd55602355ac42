//! Hinoki デバッガのコア機能
//!
//! このクレートは、命令セットシミュレータ用の簡易デバッガの中核となるロジックを提供します。
//! 式の字句解析と評価、ウォッチポイント管理、デバッガコマンドを統合します。

pub mod check;
pub mod command;
pub mod debugger;
pub mod errors;
pub mod expr_eval;
pub mod lexer;
pub mod parse;
pub mod watchpoint;

pub use command::{Command, InfoTarget};
pub use debugger::{Debugger, ExecState, PrintResult, StepOutcome};
pub use errors::{CommandError, ExprError, WatchpointError};
pub use expr_eval::ExpressionEvaluator;
pub use lexer::{tokenize, Token, TokenKind};
pub use watchpoint::{ScanResult, Watchpoint, WatchpointId, WatchpointPool};

// 他のクレートから使用するために再エクスポート
pub use hinoki_target::{Machine, Word};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
