//! tagflow core
//!
//! バージョン・制約・タグキャッシュ・ビルドテンプレートなど、
//! デーモンやネットワークに依存しない部分をまとめたクレートです。

pub mod cache;
pub mod constraint;
pub mod error;
pub mod selector;
pub mod template;
pub mod version;

pub use cache::TagCache;
pub use constraint::Constraint;
pub use error::{FlowError, Result};
pub use selector::{SelectorConfig, VersionSelector};
pub use template::{BuildContext, RenderOptions, TemplateRenderer, TemplateSet};
pub use version::Version;
