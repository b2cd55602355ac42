//! Hinoki ターゲットマシン
//!
//! このクレートは、デバッグ対象となるシミュレートされたマシンの状態を提供します。
//! レジスタファイル、物理メモリ、最小限の命令ステッパーを含みます。

pub mod machine;
pub mod memory;
pub mod registers;

pub use machine::{Machine, StopReason};
pub use memory::{Memory, MemoryError, PhysicalMemory};
pub use registers::{RegisterLookup, Registers};

/// マシンワード（すべての式の値と演算結果の型）
pub type Word = u32;

/// マシンワードのビット幅
pub const WORD_BITS: u32 = Word::BITS;

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
