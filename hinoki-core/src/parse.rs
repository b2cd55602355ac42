//! パース関連のユーティリティ関数

use crate::errors::ExprError;

/// C言語の整数リテラル規則で文字列をu64にパースする
///
/// `0x`/`0X` プレフィックスは16進数、先頭の `0` は8進数、それ以外は10進数です。
/// 末尾の `u`/`U` サフィックスを1つだけ許可します。
///
/// # Examples
/// ```
/// use hinoki_core::parse::parse_integer;
///
/// assert_eq!(parse_integer("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_integer("1234u").unwrap(), 1234);
/// assert_eq!(parse_integer("010").unwrap(), 8);
/// ```
pub fn parse_integer(literal: &str) -> Result<u64, ExprError> {
    let digits = literal
        .strip_suffix('u')
        .or_else(|| literal.strip_suffix('U'))
        .unwrap_or(literal);

    let (body, radix) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (&digits[1..], 8)
    } else {
        (digits, 10)
    };

    if body.is_empty() || !body.chars().all(|c| c.is_digit(radix)) {
        return Err(ExprError::syntax(format!("Invalid number \"{}\".", literal)));
    }

    // 桁はすべて検証済みなので、失敗するのはオーバーフローのみ
    u64::from_str_radix(body, radix).map_err(|_| ExprError::NumericOverflow {
        literal: literal.to_string(),
    })
}

/// コマンド引数の個数をパースする（10進数の数字のみ）
pub fn parse_count(arg: &str) -> Option<u64> {
    if arg.is_empty() || !arg.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    parse_integer(arg).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_hex() {
        assert_eq!(parse_integer("0x1234").unwrap(), 0x1234);
        assert_eq!(parse_integer("0X1234").unwrap(), 0x1234);
        assert_eq!(parse_integer("0xabcd").unwrap(), 0xabcd);
        assert_eq!(parse_integer("0xABCDu").unwrap(), 0xabcd);
    }

    #[test]
    fn test_parse_integer_dec_and_oct() {
        assert_eq!(parse_integer("1234").unwrap(), 1234);
        assert_eq!(parse_integer("0").unwrap(), 0);
        assert_eq!(parse_integer("0u").unwrap(), 0);
        assert_eq!(parse_integer("017").unwrap(), 0o17);
    }

    #[test]
    fn test_parse_integer_invalid() {
        assert!(matches!(parse_integer("09"), Err(ExprError::Syntax { .. })));
        assert!(matches!(parse_integer("0x"), Err(ExprError::Syntax { .. })));
        assert!(matches!(parse_integer("12uu"), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn test_parse_integer_overflow() {
        assert_eq!(parse_integer("18446744073709551615").unwrap(), u64::MAX);
        assert_eq!(
            parse_integer("18446744073709551616"),
            Err(ExprError::NumericOverflow { literal: "18446744073709551616".to_string() })
        );
        assert!(matches!(
            parse_integer("0x10000000000000000"),
            Err(ExprError::NumericOverflow { .. })
        ));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("10"), Some(10));
        assert_eq!(parse_count("0x10"), None);
        assert_eq!(parse_count("-1"), None);
        assert_eq!(parse_count(""), None);
    }
}
