// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Fibonacci calculation.

use thiserror::Error;

/// Errors a calculation can end with. These are terminal for the operation:
/// the worker records them on the calculation instead of failing the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FibonacciError {
    #[error("Fibonacci number sequences start at position 1")]
    PositionInvalid,

    #[error("Fibonacci number at position {position} overflows a 64-bit integer")]
    Overflow { position: i64 },
}

/// A generalized Fibonacci sequence defined by its first two numbers.
#[derive(Debug, Clone, Copy)]
pub struct Fibonacci {
    /// The number at position 1.
    first: i64,
    /// The number at position 2.
    second: i64,
}

impl Fibonacci {
    pub fn new(first: i64, second: i64) -> Self {
        Self { first, second }
    }

    /// The sequence member at the given 1-indexed position.
    pub fn number_at_position(&self, position: i64) -> Result<i64, FibonacciError> {
        if position < 1 {
            return Err(FibonacciError::PositionInvalid);
        }

        if position == 1 {
            return Ok(self.first);
        }
        if position == 2 {
            return Ok(self.second);
        }

        let (mut two_before, mut previous) = (self.first, self.second);
        let mut result = 0;
        for i in 3..=position {
            result = two_before
                .checked_add(previous)
                .ok_or(FibonacciError::Overflow { position: i })?;
            two_before = previous;
            previous = result;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_at_position() {
        // Given the sequence 0, 1, 1, 2, 3, 5:
        // 0: position 1, first
        // 1: position 2, second
        // 1: position 3
        // 2: position 4
        // 3: position 5
        // 5: position 6
        struct Case {
            name: &'static str,
            first: i64,
            second: i64,
            position: i64,
            expected: Result<i64, FibonacciError>,
        }

        let cases = [
            Case {
                // 0, 1, 1
                name: "start at 0 and 1 then find the third number",
                first: 0,
                second: 1,
                position: 3,
                expected: Ok(1),
            },
            Case {
                // 0, 1, 1, 2, 3, 5
                name: "start at 0 and 1 then find the sixth number",
                first: 0,
                second: 1,
                position: 6,
                expected: Ok(5),
            },
            Case {
                name: "negative position is an error",
                first: 0,
                second: 1,
                position: -1,
                expected: Err(FibonacciError::PositionInvalid),
            },
            Case {
                name: "position zero is an error",
                first: 0,
                second: 1,
                position: 0,
                expected: Err(FibonacciError::PositionInvalid),
            },
            Case {
                name: "first position gives the first number",
                first: 32,
                second: 41,
                position: 1,
                expected: Ok(32),
            },
            Case {
                name: "second position gives the second number",
                first: 0,
                second: 1,
                position: 2,
                expected: Ok(1),
            },
            Case {
                // -50, 8, -42, -34, -76, -110
                name: "negative first number",
                first: -50,
                second: 8,
                position: 6,
                expected: Ok(-110),
            },
            Case {
                // 60, -23, 37, 14, 51
                name: "negative second number",
                first: 60,
                second: -23,
                position: 5,
                expected: Ok(51),
            },
            Case {
                // -1, -2, -3, -5, -8
                name: "negative numbers at positions one and two",
                first: -1,
                second: -2,
                position: 5,
                expected: Ok(-8),
            },
        ];

        for case in cases {
            let f = Fibonacci::new(case.first, case.second);
            let actual = f.number_at_position(case.position);
            assert_eq!(actual, case.expected, "{}", case.name);
        }
    }

    #[test]
    fn test_number_at_position_reports_overflow() {
        let f = Fibonacci::new(i64::MAX, i64::MAX);
        assert_eq!(
            f.number_at_position(3),
            Err(FibonacciError::Overflow { position: 3 })
        );

        // Positions 1 and 2 never add, so they cannot overflow.
        assert_eq!(f.number_at_position(2), Ok(i64::MAX));
    }
}
