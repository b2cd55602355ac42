//! 式評価のセルフチェック
//!
//! `期待値 式` 形式の行を読み、式の評価結果を期待値と照合します。

use crate::expr_eval::ExpressionEvaluator;
use crate::parse::parse_integer;
use crate::Result;
use hinoki_target::Word;
use std::io::BufRead;

/// 失敗したケース
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    /// 1始まりの行番号
    pub line: usize,
    pub expression: String,
    pub reason: String,
}

/// チェック結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub passed: usize,
    pub failures: Vec<CheckFailure>,
}

impl CheckReport {
    /// 全ケースが成功したか
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// ケースを読み込んで評価する
///
/// 空行は無視します。期待値が数値として読めない行は失敗として記録します。
pub fn run_cases<R: BufRead>(reader: R, evaluator: &ExpressionEvaluator<'_>) -> Result<CheckReport> {
    let mut report = CheckReport::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (expected, expression) = match line.split_once(char::is_whitespace) {
            Some((expected, expression)) => (expected, expression.trim()),
            None => (line, ""),
        };

        let outcome = match parse_integer(expected) {
            Ok(expected) => {
                let expected = expected as Word;
                match evaluator.evaluate_str(expression) {
                    Ok(value) if value == expected => Ok(()),
                    Ok(value) => Err(format!("expect 0x{:x} ; result 0x{:x}", expected, value)),
                    Err(e) => Err(e.to_string()),
                }
            }
            Err(e) => Err(format!("expected value: {}", e)),
        };

        match outcome {
            Ok(()) => report.passed += 1,
            Err(reason) => report.failures.push(CheckFailure {
                line: line_no,
                expression: expression.to_string(),
                reason,
            }),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hinoki_target::Machine;

    #[test]
    fn test_run_cases() {
        let machine = Machine::new(4096);
        let evaluator = ExpressionEvaluator::for_target(&machine);
        let input = "7 1+2*3\n\n3 8-3-2\n5 2+2\n1 10/0\nzz 1\n";

        let report = run_cases(input.as_bytes(), &evaluator).unwrap();
        assert_eq!(report.passed, 2);
        assert!(!report.is_success());

        let lines: Vec<usize> = report.failures.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![4, 5, 6]);
        assert_eq!(report.failures[0].reason, "expect 0x5 ; result 0x4");
        assert_eq!(report.failures[1].reason, "Divide by zero.");
    }
}
