//! Dockyard Build
//!
//! ステージ単位のビルド、依存キャッシュ、ランタイムイメージの組み立てと
//! Docker へのビルド・タグ付けを提供します。

pub mod assembler;
pub mod builder;
pub mod cache;
pub mod context;
pub mod error;
pub mod executor;
pub mod fingerprint;
pub mod layer;
pub mod orchestrator;
pub mod progress;
pub mod stage;

pub use assembler::{AssembledImage, Image, ImageAssembler, render_dockerfile};
pub use builder::ImageBuilder;
pub use cache::{DependencyCache, DiskCache, MemoryCache};
pub use context::ContextBuilder;
pub use error::{BuildError, Result};
pub use executor::{CommandExecutor, StageExecutor, StageRequest};
pub use fingerprint::stage_fingerprint;
pub use layer::Layer;
pub use orchestrator::{BuildObserver, BuildOrchestrator, BuildOutput, BuildReport, StageReport};
pub use progress::BuildProgress;
pub use stage::{CacheStatus, decide, plan};
