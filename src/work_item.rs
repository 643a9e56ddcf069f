//! Turning catalog records into self-contained work items
//!
//! Every URL and path a worker needs is resolved here, before execution
//! starts, so workers never share path state.

use crate::{DifficultyRecord, MusicRecord, Region};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One song difficulty to fetch, draw and rasterize
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub music_id: u32,
    pub difficulty: String,
    pub region: Region,
    pub title: String,
    pub score_url: String,
    pub jacket_url: String,
    pub score_path: PathBuf,
    pub chart_svg_path: PathBuf,
    pub chart_png_path: PathBuf,
}

impl WorkItem {
    pub fn new(music: &MusicRecord, difficulty: &str, region: Region, output_root: &Path) -> Self {
        let padded = format!("{:04}", music.id);
        let region_dir = region.as_str();

        let score_dir = output_root.join("scores").join(region_dir).join(&padded);
        let chart_dir = output_root.join("charts").join(region_dir).join(&padded);

        Self {
            music_id: music.id,
            difficulty: difficulty.to_string(),
            region,
            title: music.title.clone(),
            score_url: score_url(region, music.id, difficulty),
            jacket_url: jacket_url(region, music.id),
            score_path: score_dir.join(format!("{difficulty}.txt")),
            chart_svg_path: chart_dir.join(format!("{difficulty}.svg")),
            chart_png_path: chart_dir.join(format!("{difficulty}.png")),
        }
    }

    /// `0042/master`, used to tag log lines and reports
    pub fn label(&self) -> String {
        format!("{:04}/{}", self.music_id, self.difficulty)
    }
}

pub fn score_url(region: Region, music_id: u32, difficulty: &str) -> String {
    format!(
        "{}/music/music_score/{:04}_01_rip/{}.txt",
        region.asset_base(),
        music_id,
        difficulty
    )
}

pub fn jacket_url(region: Region, music_id: u32) -> String {
    format!(
        "{base}/music/jacket/jacket_s_{id:03}_rip/jacket_s_{id:03}.png",
        base = region.asset_base(),
        id = music_id
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The variant points at a music id missing from the music catalog
    UnknownMusic,
    /// The same (music, difficulty) pair appeared earlier in the catalog
    Duplicate,
    /// The difficulty cannot be used as a single file name
    InvalidDifficulty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub music_id: u32,
    pub difficulty: String,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default)]
pub struct WorkPlan {
    pub items: Vec<WorkItem>,
    pub rejected: Vec<Rejected>,
}

/// Join the filtered catalogs into work items
///
/// Variants that cannot become a valid item are skipped with a warning and
/// listed in `rejected`; the first occurrence of a duplicate pair wins. Item
/// order follows `variants`.
pub fn build_work_plan(
    musics: &[MusicRecord],
    variants: &[DifficultyRecord],
    region: Region,
    output_root: &Path,
) -> WorkPlan {
    let by_id: HashMap<u32, &MusicRecord> = musics.iter().map(|m| (m.id, m)).collect();
    let mut seen: HashSet<(u32, &str)> = HashSet::new();
    let mut plan = WorkPlan::default();

    for variant in variants {
        let difficulty = variant.music_difficulty.as_str();

        let reason = if !is_safe_segment(difficulty) {
            Some(RejectReason::InvalidDifficulty)
        } else if !by_id.contains_key(&variant.music_id) {
            Some(RejectReason::UnknownMusic)
        } else if !seen.insert((variant.music_id, difficulty)) {
            Some(RejectReason::Duplicate)
        } else {
            None
        };

        match reason {
            None => {
                let music = by_id[&variant.music_id];
                plan.items
                    .push(WorkItem::new(music, difficulty, region, output_root));
            }
            Some(reason) => {
                warn!(
                    "Skipping music {} difficulty {:?}: {:?}",
                    variant.music_id, difficulty, reason
                );
                plan.rejected.push(Rejected {
                    music_id: variant.music_id,
                    difficulty: difficulty.to_string(),
                    reason,
                });
            }
        }
    }

    plan
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn music(id: u32, title: &str) -> MusicRecord {
        MusicRecord {
            id,
            title: title.to_string(),
            composer: None,
            lyricist: None,
            arranger: None,
            assetbundle_name: None,
        }
    }

    fn variant(music_id: u32, difficulty: &str) -> DifficultyRecord {
        DifficultyRecord {
            id: None,
            music_id,
            music_difficulty: difficulty.to_string(),
            play_level: Some(20),
            total_note_count: None,
        }
    }

    #[test]
    fn test_paths_and_urls_are_padded() {
        let item = WorkItem::new(&music(7, "Seven"), "expert", Region::Jp, Path::new("/out"));

        assert_eq!(
            item.score_url,
            "https://storage.sekai.best/sekai-jp-assets/music/music_score/0007_01_rip/expert.txt"
        );
        assert_eq!(
            item.jacket_url,
            "https://storage.sekai.best/sekai-jp-assets/music/jacket/jacket_s_007_rip/jacket_s_007.png"
        );
        assert_eq!(item.score_path, PathBuf::from("/out/scores/jp/0007/expert.txt"));
        assert_eq!(item.chart_svg_path, PathBuf::from("/out/charts/jp/0007/expert.svg"));
        assert_eq!(item.chart_png_path, PathBuf::from("/out/charts/jp/0007/expert.png"));
        assert_eq!(item.label(), "0007/expert");
    }

    #[test]
    fn test_output_paths_are_pairwise_distinct() {
        let musics: Vec<_> = (1..=30).map(|id| music(id, "x")).collect();
        let difficulties = ["easy", "normal", "hard", "expert", "master", "append"];
        let variants: Vec<_> = (1..=30)
            .flat_map(|id| difficulties.iter().map(move |d| variant(id, d)))
            .collect();

        let plan = build_work_plan(&musics, &variants, Region::En, Path::new("out"));
        assert_eq!(plan.items.len(), 180);
        assert!(plan.rejected.is_empty());

        let mut paths = HashSet::new();
        for item in &plan.items {
            assert!(paths.insert(item.score_path.clone()));
            assert!(paths.insert(item.chart_svg_path.clone()));
            assert!(paths.insert(item.chart_png_path.clone()));
        }
    }

    #[test]
    fn test_unknown_music_is_rejected_explicitly() {
        let musics = vec![music(1, "One")];
        let variants = vec![variant(1, "easy"), variant(99, "easy"), variant(1, "hard")];

        let plan = build_work_plan(&musics, &variants, Region::Jp, Path::new("out"));

        assert_eq!(
            plan.items
                .iter()
                .map(|i| (i.music_id, i.difficulty.as_str()))
                .collect::<Vec<_>>(),
            vec![(1, "easy"), (1, "hard")]
        );
        assert_eq!(
            plan.rejected,
            vec![Rejected {
                music_id: 99,
                difficulty: "easy".to_string(),
                reason: RejectReason::UnknownMusic,
            }]
        );
    }

    #[test]
    fn test_duplicates_and_unsafe_difficulties() {
        let musics = vec![music(1, "One")];
        let variants = vec![
            variant(1, "master"),
            variant(1, "master"),
            variant(1, "../etc"),
            variant(1, ""),
        ];

        let plan = build_work_plan(&musics, &variants, Region::Jp, Path::new("out"));

        assert_eq!(plan.items.len(), 1);
        let reasons: Vec<_> = plan.rejected.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::Duplicate,
                RejectReason::InvalidDifficulty,
                RejectReason::InvalidDifficulty
            ]
        );
    }

    #[test]
    fn test_title_comes_from_music_record() {
        let plan = build_work_plan(
            &[music(3, "Melt")],
            &[variant(3, "append")],
            Region::Tw,
            Path::new("out"),
        );
        assert_eq!(plan.items[0].title, "Melt");
        assert!(plan.items[0].score_url.contains("sekai-tc-assets"));
        assert!(plan.items[0]
            .chart_png_path
            .starts_with(Path::new("out/charts/tw/0003")));
    }
}
