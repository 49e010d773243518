//! Dockyard Container
//!
//! 仮想ネットワークでの名前解決、名前付きボリュームのライフサイクル、
//! ポート競合の検出、依存サービスの待機、Docker への変換と実行を提供します。

pub mod converter;
pub mod error;
pub mod network;
pub mod port;
pub mod runtime;
pub mod volume;
pub mod waiter;

pub use converter::*;
pub use error::*;
pub use network::*;
pub use port::*;
pub use runtime::*;
pub use volume::*;
pub use waiter::*;
