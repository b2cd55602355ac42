//! デバッガのメインロジック

use crate::errors::{ExprError, ERR_HISTORY_EMPTY, ERR_PROGRAM_ENDED};
use crate::expr_eval::ExpressionEvaluator;
use crate::watchpoint::{ScanResult, Watchpoint, WatchpointId, WatchpointPool};
use crate::Result;
use hinoki_target::{Machine, PhysicalMemory, StopReason, Word};
use tracing::{debug, info};

/// `x` コマンドで1回に読むバイト数
const EXAMINE_WIDTH: usize = 4;

/// 実行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// 命令を実行中
    Running,
    /// 停止中（ステップ完了やウォッチポイント）
    Stopped,
    /// プログラムが終了した
    Ended { pc: Word, code: Word },
    /// 実行中にエラーが発生した
    Aborted,
    /// ユーザーが終了を要求した
    Quit,
}

/// ステップ実行の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 指定された命令数を実行した
    Completed,
    /// ウォッチポイントの値が変化して停止した
    WatchpointTriggered,
    /// プログラムが終了した
    Halted { pc: Word, code: Word },
}

/// `p` コマンドの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintResult {
    /// 成功した `p` の通し番号（`$1`, `$2`, ...）
    pub index: u32,
    pub value: Word,
}

/// デバッガ
pub struct Debugger {
    /// デバッグ対象マシン
    machine: Machine,
    /// ウォッチポイント管理
    watchpoints: WatchpointPool,
    /// 実行状態
    state: ExecState,
    /// 成功した `p` の回数
    print_count: u32,
    /// 最後に成功した `p` の式
    last_print: Option<String>,
}

impl Debugger {
    /// 新しいデバッガを作成する
    pub fn new(machine: Machine) -> Self {
        Self::with_watchpoints(machine, WatchpointPool::new())
    }

    /// ウォッチポイントプールを指定してデバッガを作成する
    pub fn with_watchpoints(machine: Machine, watchpoints: WatchpointPool) -> Self {
        Self {
            machine,
            watchpoints,
            state: ExecState::Stopped,
            print_count: 0,
            last_print: None,
        }
    }

    /// 式を1回評価する
    pub fn evaluate(&self, expression: &str) -> std::result::Result<Word, ExprError> {
        ExpressionEvaluator::for_target(&self.machine).evaluate_str(expression)
    }

    /// 式を評価して履歴に記録する
    ///
    /// 式を省略した場合は最後に成功した式を再評価します。
    /// 評価に失敗した場合、履歴は変更されません。
    pub fn print(&mut self, expression: Option<&str>) -> Result<PrintResult> {
        let expression = match expression {
            Some(expression) => expression.to_string(),
            None => self
                .last_print
                .clone()
                .ok_or_else(|| anyhow::anyhow!(ERR_HISTORY_EMPTY))?,
        };

        let value = self.evaluate(&expression)?;
        self.print_count += 1;
        self.last_print = Some(expression);

        Ok(PrintResult { index: self.print_count, value })
    }

    /// 式の値をアドレスとして、`count` 個の4バイトワードを順に読み取る
    ///
    /// 読み取ったワードは `(アドレス, 値)` として1つずつ `visit` に渡します。
    /// 途中でメモリ外に達した場合、それまでのワードは渡し済みのままエラーを返します。
    pub fn examine<F>(&self, count: u64, expression: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(Word, Word),
    {
        let base = self.evaluate(expression)?;
        for i in 0..count {
            let address = base.wrapping_add((i as Word).wrapping_mul(EXAMINE_WIDTH as Word));
            let data = self.machine.read(address, EXAMINE_WIDTH)?;
            visit(address, data);
        }
        Ok(())
    }

    /// ウォッチポイントを設定する
    pub fn watch(&mut self, expression: &str) -> Result<WatchpointId> {
        let evaluator = ExpressionEvaluator::for_target(&self.machine);
        let id = self
            .watchpoints
            .create(expression, |expr| evaluator.evaluate_str(expr))?;
        Ok(id)
    }

    /// 式の値をIDとしてウォッチポイントを削除する
    pub fn delete_watchpoint(&mut self, expression: &str) -> Result<WatchpointId> {
        let id = self.evaluate(expression)?;
        self.watchpoints.release(id)?;
        Ok(id)
    }

    /// すべてのウォッチポイントを削除する
    pub fn delete_all_watchpoints(&mut self) {
        self.watchpoints.release_all();
    }

    /// 使用中のウォッチポイントを作成順に取得する
    pub fn watchpoints(&self) -> Vec<&Watchpoint> {
        self.watchpoints.list()
    }

    /// ウォッチポイントプールを取得する
    pub fn watchpoint_pool(&self) -> &WatchpointPool {
        &self.watchpoints
    }

    /// 全ウォッチポイントをスキャンする
    pub fn scan_watchpoints(&self) -> ScanResult {
        let evaluator = ExpressionEvaluator::for_target(&self.machine);
        self.watchpoints.scan(|expr| evaluator.evaluate_str(expr))
    }

    /// `n` 命令を実行する
    ///
    /// 1命令ごとにウォッチポイントをスキャンし、値の変化を検出した時点で停止します。
    pub fn step(&mut self, n: u64) -> Result<StepOutcome> {
        if matches!(self.state, ExecState::Ended { .. } | ExecState::Aborted) {
            return Err(anyhow::anyhow!(ERR_PROGRAM_ENDED));
        }

        self.state = ExecState::Running;
        for _ in 0..n {
            match self.machine.step() {
                Ok(StopReason::Step) => {}
                Ok(StopReason::Halted { pc, code }) => {
                    info!("program halted at 0x{:08x} with code {}", pc, code);
                    self.state = ExecState::Ended { pc, code };
                    return Ok(StepOutcome::Halted { pc, code });
                }
                Err(e) => {
                    self.state = ExecState::Aborted;
                    return Err(e);
                }
            }

            if self.scan_watchpoints().tripped {
                debug!("watchpoint triggered at pc 0x{:08x}", self.machine.registers().pc());
                self.state = ExecState::Stopped;
                return Ok(StepOutcome::WatchpointTriggered);
            }
        }

        self.state = ExecState::Stopped;
        Ok(StepOutcome::Completed)
    }

    /// プログラムが終了するかウォッチポイントが発火するまで実行する
    pub fn continue_execution(&mut self) -> Result<StepOutcome> {
        self.step(u64::MAX)
    }

    /// 終了を記録する
    pub fn quit(&mut self) {
        self.state = ExecState::Quit;
    }

    /// 実行中のセッションがあるか（終了確認が必要か）
    pub fn has_active_session(&self) -> bool {
        matches!(self.state, ExecState::Running | ExecState::Stopped)
    }

    /// 実行状態を取得する
    pub fn state(&self) -> ExecState {
        self.state
    }

    /// マシンを取得する
    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// マシンを可変参照で取得する
    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new(Machine::default())
    }
}
