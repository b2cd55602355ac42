//! レジスタファイル

use crate::Word;

/// 汎用レジスタのABI名（インデックス順）
pub const GPR_NAMES: [&str; 32] = [
    "$0", "ra", "sp", "gp", "tp", "t0", "t1", "t2",
    "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7",
    "s8", "s9", "s10", "s11", "t3", "t4", "t5", "t6",
];

/// 名前によるレジスタ参照
///
/// 式評価器はこのトレイトを通してのみレジスタを読みます。
pub trait RegisterLookup {
    /// レジスタ名（`$`を除いたもの）から値を取得する
    fn lookup(&self, name: &str) -> Option<Word>;
}

/// RV32のレジスタファイル
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    gpr: [Word; 32],
    pc: Word,
}

impl Registers {
    /// 全レジスタを0で初期化したレジスタファイルを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// プログラムカウンタを取得する
    pub fn pc(&self) -> Word {
        self.pc
    }

    /// プログラムカウンタを設定する
    pub fn set_pc(&mut self, pc: Word) {
        self.pc = pc;
    }

    /// 汎用レジスタを読み取る
    pub fn gpr(&self, index: usize) -> Word {
        self.gpr.get(index).copied().unwrap_or(0)
    }

    /// 汎用レジスタに書き込む
    ///
    /// x0への書き込みは無視されます。
    pub fn set_gpr(&mut self, index: usize, value: Word) {
        if index == 0 {
            return;
        }
        if let Some(slot) = self.gpr.get_mut(index) {
            *slot = value;
        }
    }

    /// ABI名またはxN形式の名前からインデックスを求める
    fn index_of(name: &str) -> Option<usize> {
        match name {
            "0" | "zero" => return Some(0),
            "fp" => return Some(8),
            _ => {}
        }
        if let Some(index) = GPR_NAMES.iter().position(|n| *n == name) {
            return Some(index);
        }
        let index: usize = name.strip_prefix('x')?.parse().ok()?;
        (index < 32).then_some(index)
    }

    /// `info r` 用に (名前, 値) の一覧を返す
    pub fn dump(&self) -> Vec<(&'static str, Word)> {
        let mut entries: Vec<(&'static str, Word)> = GPR_NAMES
            .iter()
            .zip(self.gpr.iter())
            .map(|(name, value)| (*name, *value))
            .collect();
        entries.push(("pc", self.pc));
        entries
    }
}

impl RegisterLookup for Registers {
    fn lookup(&self, name: &str) -> Option<Word> {
        if name == "pc" {
            return Some(self.pc);
        }
        Self::index_of(name).map(|index| self.gpr(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_abi_name() {
        let mut regs = Registers::new();
        regs.set_gpr(10, 42);
        assert_eq!(regs.lookup("a0"), Some(42));
        assert_eq!(regs.lookup("x10"), Some(42));
        assert_eq!(regs.lookup("nope"), None);
        assert_eq!(regs.lookup("x32"), None);
    }

    #[test]
    fn test_zero_register_is_hardwired() {
        let mut regs = Registers::new();
        regs.set_gpr(0, 7);
        assert_eq!(regs.gpr(0), 0);
        assert_eq!(regs.lookup("zero"), Some(0));
        assert_eq!(regs.lookup("0"), Some(0));
    }

    #[test]
    fn test_pc_access() {
        let mut regs = Registers::new();
        regs.set_pc(0x8000_0004);
        assert_eq!(regs.lookup("pc"), Some(0x8000_0004));
        assert_eq!(regs.dump().last(), Some(&("pc", 0x8000_0004)));
    }
}
