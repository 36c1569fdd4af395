//! # Clock（時刻プロバイダ）
//!
//! ユースケース層での `Utc::now()` 直接呼び出しを置き換え、
//! テストで固定時刻を注入可能にするための抽象化。
//!
//! メッセージの受付時刻とアーカイブレコードの送信時刻は、
//! すべてこのトレイト経由で取得する。

use chrono::{DateTime, Utc};

/// 現在時刻を提供するトレイト
pub trait Clock: Send + Sync {
   fn now(&self) -> DateTime<Utc>;
}

/// 実際のシステム時刻を返す実装
pub struct SystemClock;

impl Clock for SystemClock {
   fn now(&self) -> DateTime<Utc> {
      Utc::now()
   }
}

/// 固定時刻を返すテスト用実装
pub struct FixedClock {
   now: DateTime<Utc>,
}

impl FixedClock {
   pub fn new(now: DateTime<Utc>) -> Self {
      Self { now }
   }

   /// UNIX タイムスタンプ（秒）から固定時刻を作成する
   ///
   /// # パニック
   ///
   /// 範囲外のタイムスタンプを渡した場合はパニックする。テスト専用。
   pub fn from_timestamp(secs: i64) -> Self {
      Self {
         now: DateTime::from_timestamp(secs, 0).expect("不正なタイムスタンプ"),
      }
   }
}

impl Clock for FixedClock {
   fn now(&self) -> DateTime<Utc> {
      self.now
   }
}
