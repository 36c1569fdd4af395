//! # 配信サービスライブラリ
//!
//! 配信サービスのユースケース・ハンドラ・ワーカーを公開する。
//! テスト用に内部モジュールへのアクセスを提供する。

pub mod error;
pub mod handler;
pub mod usecase;
pub mod worker;

// テストユーティリティ（内部実装、ドキュメントからは隠す）
#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;
