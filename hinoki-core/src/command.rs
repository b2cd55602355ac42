//! デバッガコマンド

use crate::errors::CommandError;
use crate::parse::parse_count;

/// コマンド名と説明の一覧（`help` 用）
pub const COMMANDS: [(&str, &str); 9] = [
    ("help", "Display information about all supported commands."),
    ("c", "Continue the execution of the program."),
    ("q", "Exit hinoki."),
    ("si", "Step N instructions (default 1)."),
    ("info", "Display registers (info r) or watchpoints (info w)."),
    ("x", "Scan N 4-byte words of memory starting at EXPR."),
    ("p", "Evaluate EXPR, or the last printed expression."),
    ("w", "Set a watchpoint on EXPR."),
    ("d", "Delete watchpoint EXPR, or all watchpoints."),
];

/// `info` の対象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoTarget {
    Registers,
    Watchpoints,
}

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ヘルプ表示
    Help(Option<String>),
    /// 実行継続
    Continue,
    /// 終了
    Quit,
    /// N命令のステップ実行
    StepInstruction(u64),
    /// レジスタ・ウォッチポイント表示
    Info(InfoTarget),
    /// メモリ表示
    Examine { count: u64, expression: String },
    /// 式の評価と表示
    Print(Option<String>),
    /// ウォッチポイントを設定
    Watch(String),
    /// ウォッチポイントを削除（引数なしで全削除）
    Delete(Option<String>),
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 空行の場合は `Ok(None)` を返します。
    pub fn parse(input: &str) -> Result<Option<Self>, CommandError> {
        let input = input.trim();
        let (name, args) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };
        if name.is_empty() {
            return Ok(None);
        }
        let args = (!args.is_empty()).then_some(args);

        let command = match name {
            "help" => Command::Help(args.map(|a| a.split_whitespace().next().unwrap_or(a).to_string())),
            "c" => Command::Continue,
            "q" => Command::Quit,
            "si" => Command::StepInstruction(Self::parse_step_count(args)?),
            "info" => Command::Info(Self::parse_info(args)?),
            "x" => Self::parse_examine(args)?,
            "p" => Command::Print(args.map(str::to_string)),
            "w" => Command::Watch(
                args.ok_or(CommandError::MissingArgument(
                    "Argument required (expression to compute).",
                ))?
                .to_string(),
            ),
            "d" => Command::Delete(args.map(str::to_string)),
            _ => return Err(CommandError::UnknownCommand(name.to_string())),
        };
        Ok(Some(command))
    }

    /// `si [N]` の引数をパースする
    fn parse_step_count(args: Option<&str>) -> Result<u64, CommandError> {
        let Some(args) = args else {
            return Ok(1);
        };
        let parts: Vec<&str> = args.split_whitespace().collect();
        if parts.len() > 1 {
            return Err(CommandError::Ambiguous { command: "si", args: args.to_string() });
        }
        parse_count(parts[0]).ok_or_else(|| CommandError::InvalidNumber(parts[0].to_string()))
    }

    /// `info SUBCMD` の引数をパースする
    fn parse_info(args: Option<&str>) -> Result<InfoTarget, CommandError> {
        let args = args.ok_or(CommandError::MissingArgument("info command cannot be empty."))?;
        let parts: Vec<&str> = args.split_whitespace().collect();
        if parts.len() > 1 {
            return Err(CommandError::Ambiguous { command: "info", args: args.to_string() });
        }
        match parts[0] {
            "r" => Ok(InfoTarget::Registers),
            "w" => Ok(InfoTarget::Watchpoints),
            other => Err(CommandError::UnknownInfoSubcommand(other.to_string())),
        }
    }

    /// `x N EXPR` の引数をパースする
    fn parse_examine(args: Option<&str>) -> Result<Command, CommandError> {
        let args = args.ok_or(CommandError::MissingArgument(
            "Argument required (starting display address).",
        ))?;
        let (count_str, expression) = match args.split_once(char::is_whitespace) {
            Some((count, rest)) => (count, rest.trim()),
            None => (args, ""),
        };

        let count = parse_count(count_str)
            .ok_or_else(|| CommandError::InvalidNumber(count_str.to_string()))?;
        if count == 0 {
            return Err(CommandError::ZeroCount);
        }
        if expression.is_empty() {
            return Err(CommandError::MissingArgument("Expression is required for x command."));
        }

        Ok(Command::Examine { count, expression: expression.to_string() })
    }

    /// コマンド名の説明を取得する
    pub fn describe(name: &str) -> Option<&'static str> {
        COMMANDS
            .iter()
            .find(|(command, _)| *command == name)
            .map(|(_, description)| *description)
    }
}
