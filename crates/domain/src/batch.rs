//! # 配信バッチ
//!
//! 解決済み宛先集合を上限サイズ付きのバッチへ分割するロジックを定義する。
//!
//! ## 設計方針
//!
//! - **純粋関数**: 分割は副作用を持たない計算であり、ドメイン層に置く
//! - **順序は意味を持たない**: バッチ間・バッチ内とも宛先の並び順に意味はなく、
//!   安定した任意の分割であればよい
//! - **上限の根拠**: 1 バッチ = 配信キューの 1 アイテム。バッチサイズの上限に
//!   より、1 アイテムあたりの処理量と再試行の影響範囲を抑える
//!
//! ## 分割の性質
//!
//! N 件の宛先をサイズ S で分割すると:
//!
//! - バッチ数は `ceil(N / S)`
//! - 各宛先はちょうど 1 つのバッチに含まれる
//! - すべてのバッチのサイズは S 以下（最後のバッチのみ S 未満になりうる）

use serde::{Deserialize, Serialize};

use crate::{DomainError, recipient::RecipientRecord};

/// バッチサイズの既定値
///
/// 1 回の配信キューアイテムが扱う宛先数の上限。外部メールインフラの
/// 同時宛先数制限に対する保守的な値として 50 を採用する。
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// 配信バッチ
///
/// 1 つの配信キューアイテムとして処理される宛先の集まり。
/// [`split_into_batches`] 経由でのみ作成される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientBatch {
    records: Vec<RecipientRecord>,
}

impl RecipientBatch {
    /// バッチ内の宛先数を返す
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// バッチが空か判定する
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 宛先レコードのスライスを取得する
    pub fn records(&self) -> &[RecipientRecord] {
        &self.records
    }
}

/// 宛先集合を上限サイズ付きのバッチへ分割する
///
/// # 引数
///
/// - `recipients`: 重複排除済みの宛先レコード列
/// - `size`: 1 バッチあたりの宛先数の上限（1 以上）
///
/// # エラー
///
/// `size` が 0 の場合は `DomainError::Validation` を返す。
///
/// # 使用例
///
/// ```rust
/// use kairan_domain::batch::{DEFAULT_BATCH_SIZE, split_into_batches};
///
/// let batches = split_into_batches(vec![], DEFAULT_BATCH_SIZE)?;
/// assert!(batches.is_empty());
/// # Ok::<(), kairan_domain::DomainError>(())
/// ```
pub fn split_into_batches(
    recipients: Vec<RecipientRecord>,
    size: usize,
) -> Result<Vec<RecipientBatch>, DomainError> {
    if size == 0 {
        return Err(DomainError::Validation(
            "バッチサイズは 1 以上である必要があります".to_string(),
        ));
    }

    let mut batches = Vec::with_capacity(recipients.len().div_ceil(size));
    let mut current = Vec::new();

    for record in recipients {
        current.push(record);
        if current.len() == size {
            batches.push(RecipientBatch {
                records: std::mem::take(&mut current),
            });
        }
    }

    if !current.is_empty() {
        batches.push(RecipientBatch { records: current });
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::recipient::{AccountId, Email, Locale};

    fn make_recipients(count: usize) -> Vec<RecipientRecord> {
        (0..count)
            .map(|i| {
                RecipientRecord::new(
                    AccountId::new(),
                    Email::new(format!("member{i}@example.com")).unwrap(),
                    Locale::default(),
                )
            })
            .collect()
    }

    #[test]
    fn test_バッチサイズ0はエラー() {
        assert!(split_into_batches(make_recipients(1), 0).is_err());
    }

    #[test]
    fn test_空の宛先集合はバッチを生成しない() {
        let batches = split_into_batches(vec![], DEFAULT_BATCH_SIZE).unwrap();
        assert!(batches.is_empty());
    }

    #[rstest]
    #[case(1, 50, 1)]
    #[case(42, 50, 1)]
    #[case(50, 50, 1)]
    #[case(51, 50, 2)]
    #[case(100, 50, 2)]
    #[case(409, 50, 9)]
    #[case(7, 3, 3)]
    fn test_バッチ数はceil_n割るsに一致する(
        #[case] n: usize,
        #[case] size: usize,
        #[case] expected: usize,
    ) {
        let batches = split_into_batches(make_recipients(n), size).unwrap();
        assert_eq!(batches.len(), expected);
    }

    #[test]
    fn test_409件をサイズ50で分割すると8個の満杯バッチと1個の端数バッチになる() {
        let batches = split_into_batches(make_recipients(409), 50).unwrap();

        assert_eq!(batches.len(), 9);
        for batch in &batches[..8] {
            assert_eq!(batch.len(), 50);
        }
        assert_eq!(batches[8].len(), 9);
    }

    #[test]
    fn test_各宛先はちょうど1つのバッチに含まれる() {
        let recipients = make_recipients(123);
        let expected: HashSet<_> = recipients
            .iter()
            .map(|r| r.account_id().clone())
            .collect();

        let batches = split_into_batches(recipients, 10).unwrap();

        let mut seen = HashSet::new();
        let mut total = 0;
        for batch in &batches {
            for record in batch.records() {
                seen.insert(record.account_id().clone());
                total += 1;
            }
        }
        assert_eq!(total, 123);
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_すべてのバッチはサイズ上限以下() {
        let batches = split_into_batches(make_recipients(77), 10).unwrap();

        assert!(batches.iter().all(|b| b.len() <= 10));
    }
}
