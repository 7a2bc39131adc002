//! tagflow のイメージビルド
//!
//! ビルドコンテキストの作成、Docker デーモンでのビルド・タグ付け・プッシュ・削除、
//! そしてバージョンごとにそれらを回すパイプラインを提供します。

pub mod auth;
pub mod builder;
pub mod context;
pub mod docker;
pub mod engine;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod pusher;

pub use auth::RegistryAuth;
pub use builder::ImageBuilder;
pub use context::ContextBuilder;
pub use docker::DockerEngine;
pub use engine::{BuildEngine, BuiltImage};
pub use error::{BuildError, BuildResult, PipelineError};
pub use output::{DaemonLine, LineScan};
pub use pipeline::{
    ArtifactWindow, ImageGeneration, Pipeline, PipelineOptions, PipelineReport, PipelineState,
    RunStatus,
};
pub use progress::BuildProgress;
pub use pusher::{ImagePusher, split_image_tag, validate_tag};

pub use bollard::auth::DockerCredentials;
