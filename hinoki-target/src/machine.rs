//! シミュレートされたマシンと命令ステッパー
//!
//! 実際のISA実行エンジンの代わりとなる最小限のステッパーです。
//! `ebreak` で停止し、それ以外の命令はPCを4進めるだけです。

use crate::memory::{Memory, PhysicalMemory, DEFAULT_MEMORY_SIZE, MEMORY_BASE};
use crate::registers::{RegisterLookup, Registers};
use crate::{Result, Word};
use std::path::Path;
use tracing::{debug, info};

/// `ebreak` 命令のエンコーディング
pub const EBREAK: Word = 0x0010_0073;

/// イメージ未指定時に読み込む組み込みイメージ
const BUILTIN_IMAGE: [Word; 5] = [
    0x0000_0297, // auipc t0,0
    0x0002_8823, // sb  zero,16(t0)
    0x0102_c503, // lbu a0,16(t0)
    EBREAK,      // ebreak
    0xdead_beef, // some data
];

/// 停止イベントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// 1命令の実行完了
    Step,
    /// プログラム終了（`ebreak`）
    Halted { pc: Word, code: Word },
}

/// デバッグ対象のマシン
pub struct Machine {
    registers: Registers,
    memory: Memory,
}

impl Machine {
    /// 指定サイズのメモリを持つマシンを作成し、組み込みイメージを読み込む
    pub fn new(memory_size: usize) -> Self {
        let mut machine = Self {
            registers: Registers::new(),
            memory: Memory::new(memory_size),
        };
        machine.load_builtin_image();
        machine
    }

    /// 組み込みイメージを読み込み、PCをリセットする
    fn load_builtin_image(&mut self) {
        let bytes: Vec<u8> = BUILTIN_IMAGE.iter().flat_map(|w| w.to_le_bytes()).collect();
        // メモリが小さすぎる場合は空のまま
        if self.memory.write_bytes(MEMORY_BASE, &bytes).is_err() {
            debug!("memory too small for the built-in image");
        }
        self.registers.set_pc(MEMORY_BASE);
    }

    /// 生のバイナリイメージをメモリ先頭に読み込む
    ///
    /// 読み込んだバイト数を返します。
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Can not open '{}': {}", path.display(), e))?;
        self.memory.write_bytes(MEMORY_BASE, &bytes)?;
        self.registers.set_pc(MEMORY_BASE);
        info!("The image is {}, size = {}", path.display(), bytes.len());
        Ok(bytes.len())
    }

    /// 1命令を実行する
    pub fn step(&mut self) -> Result<StopReason> {
        let pc = self.registers.pc();
        let inst = self.memory.read(pc, 4)?;
        if inst == EBREAK {
            let code = self.registers.gpr(10);
            return Ok(StopReason::Halted { pc, code });
        }
        self.registers.set_pc(pc.wrapping_add(4));
        Ok(StopReason::Step)
    }

    /// レジスタファイルを取得する
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    /// レジスタファイルを可変参照で取得する
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// 物理メモリを取得する
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// 物理メモリを可変参照で取得する
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

impl RegisterLookup for Machine {
    fn lookup(&self, name: &str) -> Option<Word> {
        self.registers.lookup(name)
    }
}

impl PhysicalMemory for Machine {
    fn read(&self, address: Word, width: usize) -> std::result::Result<Word, crate::MemoryError> {
        self.memory.read(address, width)
    }
}
