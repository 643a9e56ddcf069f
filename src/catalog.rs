//! Master-database catalogs: songs and their difficulty variants
//!
//! The catalogs are plain JSON arrays published per region. Loading them is
//! a single request each with no retries; filtering is a pure function over
//! the returned records.

use crate::{AssetFetcher, ChartError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Server region a catalog and its assets belong to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    #[default]
    Jp,
    En,
    Tw,
    Kr,
    Cn,
}

impl Region {
    /// Path segment used in the output layout
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Jp => "jp",
            Region::En => "en",
            Region::Tw => "tw",
            Region::Kr => "kr",
            Region::Cn => "cn",
        }
    }

    pub fn catalog_base(&self) -> &'static str {
        match self {
            Region::Jp => "https://sekai-world.github.io/sekai-master-db-diff",
            Region::En => "https://sekai-world.github.io/sekai-master-db-en-diff",
            Region::Tw => "https://sekai-world.github.io/sekai-master-db-tc-diff",
            Region::Kr => "https://sekai-world.github.io/sekai-master-db-kr-diff",
            Region::Cn => "https://sekai-world.github.io/sekai-master-db-cn-diff",
        }
    }

    pub fn asset_base(&self) -> &'static str {
        match self {
            Region::Jp => "https://storage.sekai.best/sekai-jp-assets",
            Region::En => "https://storage.sekai.best/sekai-en-assets",
            Region::Tw => "https://storage.sekai.best/sekai-tc-assets",
            Region::Kr => "https://storage.sekai.best/sekai-kr-assets",
            Region::Cn => "https://storage.sekai.best/sekai-cn-assets",
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One song in the `musics` catalog
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicRecord {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub composer: Option<String>,
    #[serde(default)]
    pub lyricist: Option<String>,
    #[serde(default)]
    pub arranger: Option<String>,
    #[serde(default)]
    pub assetbundle_name: Option<String>,
}

/// One playable difficulty of a song in the `musicDifficulties` catalog
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyRecord {
    #[serde(default)]
    pub id: Option<u32>,
    pub music_id: u32,
    pub music_difficulty: String,
    #[serde(default)]
    pub play_level: Option<u32>,
    #[serde(default)]
    pub total_note_count: Option<u32>,
}

pub struct CatalogClient {
    fetcher: Arc<dyn AssetFetcher>,
    base: String,
}

impl CatalogClient {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, region: Region) -> Self {
        Self::with_base(fetcher, region.catalog_base())
    }

    pub fn with_base(fetcher: Arc<dyn AssetFetcher>, base: impl Into<String>) -> Self {
        Self {
            fetcher,
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch_musics(&self) -> Result<Vec<MusicRecord>, ChartError> {
        self.fetch_list("musics").await
    }

    pub async fn fetch_difficulties(&self) -> Result<Vec<DifficultyRecord>, ChartError> {
        self.fetch_list("musicDifficulties").await
    }

    async fn fetch_list<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, ChartError> {
        let url = format!("{}/{}.json", self.base, name);
        let body = self.fetcher.fetch(&url).await?;

        let records: Vec<T> = serde_json::from_slice(&body)
            .map_err(|e| ChartError::Format(format!("{name}.json: {e}")))?;

        info!("Loaded {} records from {}", records.len(), url);
        Ok(records)
    }
}

/// Which songs and difficulties a run covers
///
/// `None` on either axis means no filtering on that axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub music_ids: Option<BTreeSet<u32>>,
    pub difficulties: Option<BTreeSet<String>>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches_music(&self, id: u32) -> bool {
        self.music_ids.as_ref().map_or(true, |ids| ids.contains(&id))
    }

    pub fn matches_variant(&self, record: &DifficultyRecord) -> bool {
        self.matches_music(record.music_id)
            && self
                .difficulties
                .as_ref()
                .map_or(true, |d| d.contains(&record.music_difficulty))
    }

    pub fn apply(
        &self,
        musics: Vec<MusicRecord>,
        variants: Vec<DifficultyRecord>,
    ) -> (Vec<MusicRecord>, Vec<DifficultyRecord>) {
        let musics = musics
            .into_iter()
            .filter(|m| self.matches_music(m.id))
            .collect();
        let variants = variants
            .into_iter()
            .filter(|v| self.matches_variant(v))
            .collect();
        (musics, variants)
    }
}
