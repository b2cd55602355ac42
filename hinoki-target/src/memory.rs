//! 物理メモリ

use crate::Word;
use thiserror::Error;

/// 物理メモリの開始アドレス
pub const MEMORY_BASE: Word = 0x8000_0000;

/// デフォルトの物理メモリサイズ（128MiB）
pub const DEFAULT_MEMORY_SIZE: usize = 128 * 1024 * 1024;

/// メモリアクセスのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// 物理メモリの範囲外へのアクセス
    #[error("address 0x{address:08x} is out of bound of pmem [0x{start:08x}, 0x{end:08x}]")]
    OutOfBound { address: Word, start: Word, end: Word },
    /// サポートしていないアクセス幅
    #[error("unsupported access width {0}")]
    InvalidWidth(usize),
    /// バイト列の長さが型のサイズと一致しない
    #[error("expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

/// バイト単位で読み取れる物理メモリ
pub trait PhysicalMemory {
    /// `address` から `width` バイト（1, 2, 4）をリトルエンディアンで読み取る
    fn read(&self, address: Word, width: usize) -> Result<Word, MemoryError>;
}

/// メモリから読み取り可能な型
pub trait MemoryReadable: Sized {
    /// リトルエンディアンのバイト列から値を構築
    fn from_le_slice(bytes: &[u8]) -> Result<Self, MemoryError>;

    /// 型のサイズ（バイト数）
    fn size() -> usize;
}

impl MemoryReadable for u32 {
    fn from_le_slice(bytes: &[u8]) -> Result<Self, MemoryError> {
        let array: [u8; 4] = bytes
            .try_into()
            .map_err(|_| MemoryError::ShortRead { expected: 4, actual: bytes.len() })?;
        Ok(u32::from_le_bytes(array))
    }

    fn size() -> usize { 4 }
}

impl MemoryReadable for u16 {
    fn from_le_slice(bytes: &[u8]) -> Result<Self, MemoryError> {
        let array: [u8; 2] = bytes
            .try_into()
            .map_err(|_| MemoryError::ShortRead { expected: 2, actual: bytes.len() })?;
        Ok(u16::from_le_bytes(array))
    }

    fn size() -> usize { 2 }
}

impl MemoryReadable for u8 {
    fn from_le_slice(bytes: &[u8]) -> Result<Self, MemoryError> {
        match bytes {
            [byte] => Ok(*byte),
            _ => Err(MemoryError::ShortRead { expected: 1, actual: bytes.len() }),
        }
    }

    fn size() -> usize { 1 }
}

/// フラットな物理メモリ
pub struct Memory {
    base: Word,
    data: Vec<u8>,
}

impl Memory {
    /// `size` バイトのゼロ初期化メモリを作成する
    pub fn new(size: usize) -> Self {
        Self::with_base(MEMORY_BASE, size)
    }

    /// 開始アドレスを指定してメモリを作成する
    pub fn with_base(base: Word, size: usize) -> Self {
        Self {
            base,
            data: vec![0; size],
        }
    }

    /// 開始アドレスを取得する
    pub fn base(&self) -> Word {
        self.base
    }

    /// メモリサイズを取得する
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// アドレス範囲をバッファ内のオフセットに変換する
    fn offset_of(&self, address: Word, len: usize) -> Result<usize, MemoryError> {
        let out_of_bound = || MemoryError::OutOfBound {
            address,
            start: self.base,
            end: self.base.wrapping_add(self.data.len().saturating_sub(1) as Word),
        };
        let offset = address.checked_sub(self.base).ok_or_else(out_of_bound)? as usize;
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset),
            _ => Err(out_of_bound()),
        }
    }

    /// 型を指定して読み取る
    pub fn read_value<T: MemoryReadable>(&self, address: Word) -> Result<T, MemoryError> {
        let offset = self.offset_of(address, T::size())?;
        T::from_le_slice(&self.data[offset..offset + T::size()])
    }

    /// バイト列を書き込む
    pub fn write_bytes(&mut self, address: Word, bytes: &[u8]) -> Result<(), MemoryError> {
        let offset = self.offset_of(address, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// 32ビットワードを書き込む
    pub fn write_u32(&mut self, address: Word, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

impl PhysicalMemory for Memory {
    fn read(&self, address: Word, width: usize) -> Result<Word, MemoryError> {
        match width {
            1 => self.read_value::<u8>(address).map(Word::from),
            2 => self.read_value::<u16>(address).map(Word::from),
            4 => self.read_value::<u32>(address),
            _ => Err(MemoryError::InvalidWidth(width)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_little_endian() {
        let mut mem = Memory::new(64);
        mem.write_u32(MEMORY_BASE + 4, 0x1234_5678).unwrap();
        assert_eq!(mem.read(MEMORY_BASE + 4, 4).unwrap(), 0x1234_5678);
        assert_eq!(mem.read(MEMORY_BASE + 4, 2).unwrap(), 0x5678);
        assert_eq!(mem.read(MEMORY_BASE + 7, 1).unwrap(), 0x12);
    }

    #[test]
    fn test_out_of_bound() {
        let mem = Memory::new(16);
        assert!(matches!(
            mem.read(MEMORY_BASE - 4, 4),
            Err(MemoryError::OutOfBound { .. })
        ));
        assert!(mem.read(MEMORY_BASE + 12, 4).is_ok());
        assert!(mem.read(MEMORY_BASE + 13, 4).is_err());
    }

    #[test]
    fn test_from_le_slice_length_mismatch() {
        assert_eq!(u32::from_le_slice(&[1, 0, 0, 0]), Ok(1));
        assert_eq!(
            u32::from_le_slice(&[1, 2]),
            Err(MemoryError::ShortRead { expected: 4, actual: 2 })
        );
        assert_eq!(
            u16::from_le_slice(&[]),
            Err(MemoryError::ShortRead { expected: 2, actual: 0 })
        );
        assert_eq!(
            u8::from_le_slice(&[1, 2]),
            Err(MemoryError::ShortRead { expected: 1, actual: 2 })
        );
    }

    #[test]
    fn test_base_and_size() {
        let mem = Memory::with_base(0x1000, 32);
        assert_eq!(mem.base(), 0x1000);
        assert_eq!(mem.size(), 32);
        assert!(mem.read(0x1000 + 28, 4).is_ok());
        assert!(mem.read(0x0ffc, 4).is_err());
    }

    #[test]
    fn test_invalid_width() {
        let mem = Memory::new(16);
        assert_eq!(mem.read(MEMORY_BASE, 3), Err(MemoryError::InvalidWidth(3)));
    }
}
