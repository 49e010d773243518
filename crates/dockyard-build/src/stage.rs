//! ステージの再実行判定
//!
//! 判定は (キャッシュの有無, 上流の再実行有無) だけから決まる純粋関数で、
//! 実際のビルドを行わずにテストできます。

use serde::Serialize;

/// ステージのキャッシュ判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// キャッシュ済みの出力を再利用
    Hit,
    /// 再実行
    Miss,
}

impl CacheStatus {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hit => "cached",
            Self::Miss => "built",
        }
    }
}

/// 1ステージ分の判定
///
/// 上流のいずれかが再実行された場合、自身のキャッシュがあっても再実行する。
pub fn decide(cached: bool, upstream_rebuilt: bool) -> CacheStatus {
    if cached && !upstream_rebuilt {
        CacheStatus::Hit
    } else {
        CacheStatus::Miss
    }
}

/// ステージ列全体の判定
///
/// `cached[i]` はステージ i のキーがキャッシュに存在するか。
pub fn plan(cached: &[bool]) -> Vec<CacheStatus> {
    let mut upstream_rebuilt = false;
    cached
        .iter()
        .map(|&hit| {
            let status = decide(hit, upstream_rebuilt);
            upstream_rebuilt |= status == CacheStatus::Miss;
            status
        })
        .collect()
}
