//! テストユーティリティ
//!
//! ユニットテストと結合テストで共有するセットアップ部品。

mod pipeline_test_builder;

pub use pipeline_test_builder::{PipelineSetup, PipelineTestBuilder};
