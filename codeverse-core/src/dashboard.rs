//! Dashboard aggregation: project statistics, login streaks, tips, editor links.

use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::model::Project;

/// Aggregated counters shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct DashboardStats {
    pub total_projects: u64,
    pub total_lines: u64,
    pub total_files: u64,
    pub avg_files_per_project: f64,
}

impl DashboardStats {
    pub fn from_projects(projects: &[Project]) -> Self {
        let total_projects = projects.len() as u64;
        let total_lines = projects.iter().map(|p| p.lines_of_code).sum();
        let total_files: u64 = projects.iter().map(|p| p.files_count).sum();
        let avg_files_per_project = if total_projects == 0 {
            0.0
        } else {
            total_files as f64 / total_projects as f64
        };
        Self {
            total_projects,
            total_lines,
            total_files,
            avg_files_per_project,
        }
    }
}

/// Consecutive login days ending at `today`.
///
/// A streak that ended yesterday is still current: the user has the rest of
/// today to extend it.
pub fn current_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut cursor = if days.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while days.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodingTip {
    pub title: &'static str,
    pub desc: &'static str,
}

pub const CODING_TIPS: [CodingTip; 12] = [
    CodingTip {
        title: "Write Readable Code",
        desc: "Always write code as if the next person to maintain it is a violent psychopath who knows where you live.",
    },
    CodingTip {
        title: "Use Version Control",
        desc: "Commit early and often. Small, frequent commits make it easier to track changes and revert if needed.",
    },
    CodingTip {
        title: "Test Your Code",
        desc: "Write tests before you write the code (TDD). It helps clarify requirements and prevents bugs.",
    },
    CodingTip {
        title: "Keep Functions Small",
        desc: "Functions should do one thing and do it well. If it's doing multiple things, split it up.",
    },
    CodingTip {
        title: "Use Meaningful Names",
        desc: "Variable and function names should reveal intent. Avoid abbreviations and single-letter names.",
    },
    CodingTip {
        title: "Document Your Code",
        desc: "Write comments that explain why, not what. The code should be self-explanatory for the what.",
    },
    CodingTip {
        title: "Refactor Regularly",
        desc: "Don't let technical debt accumulate. Refactor code as you work on it.",
    },
    CodingTip {
        title: "Learn Debugging Tools",
        desc: "Master your IDE's debugging features. It will save you hours of debugging time.",
    },
    CodingTip {
        title: "Code Review",
        desc: "Always have someone else review your code. Fresh eyes catch things you might miss.",
    },
    CodingTip {
        title: "Stay Updated",
        desc: "Keep learning new technologies and best practices, but don't chase every new trend.",
    },
    CodingTip {
        title: "Error Handling",
        desc: "Always handle errors gracefully. Don't let your application crash unexpectedly.",
    },
    CodingTip {
        title: "Performance Matters",
        desc: "Write efficient code, but don't optimize prematurely. Focus on readability first.",
    },
];

/// Pick `n` distinct tips at random (fewer if `n` exceeds the catalogue).
pub fn sample_tips(n: usize) -> Vec<CodingTip> {
    let mut rng = rand::thread_rng();
    CODING_TIPS.choose_multiple(&mut rng, n).copied().collect()
}

/// Link to a brand-new editor room. Returns the room id with the URL.
pub fn quick_room_link(editor_url: &str, username: &str, action: &str) -> (Uuid, String) {
    let room_id = Uuid::new_v4();
    let url = format!(
        "{}/editor/{}?username={}&from={}",
        editor_url.trim_end_matches('/'),
        room_id.simple(),
        urlencoding::encode(username),
        urlencoding::encode(action),
    );
    (room_id, url)
}

/// Link to the editor room of an existing file.
pub fn file_editor_link(editor_url: &str, username: &str, room_id: Uuid) -> String {
    format!(
        "{}/editor/{}?username={}",
        editor_url.trim_end_matches('/'),
        room_id.simple(),
        urlencoding::encode(username),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Language;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_stats_empty() {
        let stats = DashboardStats::from_projects(&[]);
        assert_eq!(stats.total_projects, 0);
        assert_eq!(stats.avg_files_per_project, 0.0);
    }

    #[test]
    fn test_stats_aggregate() {
        let owner = Uuid::new_v4();
        let mut a = Project::new(owner, "a", Language::Python);
        a.files_count = 3;
        a.lines_of_code = 120;
        let mut b = Project::new(owner, "b", Language::Java);
        b.files_count = 1;
        b.lines_of_code = 30;

        let stats = DashboardStats::from_projects(&[a, b]);
        assert_eq!(stats.total_projects, 2);
        assert_eq!(stats.total_files, 4);
        assert_eq!(stats.total_lines, 150);
        assert_eq!(stats.avg_files_per_project, 2.0);
    }

    #[test]
    fn test_streak_including_today() {
        let days: BTreeSet<_> = ["2025-03-01", "2025-03-02", "2025-03-03"]
            .into_iter()
            .map(day)
            .collect();
        assert_eq!(current_streak(&days, day("2025-03-03")), 3);
    }

    #[test]
    fn test_streak_ending_yesterday_still_counts() {
        let days: BTreeSet<_> = ["2025-03-01", "2025-03-02"].into_iter().map(day).collect();
        assert_eq!(current_streak(&days, day("2025-03-03")), 2);
    }

    #[test]
    fn test_streak_broken() {
        let days: BTreeSet<_> = ["2025-03-01", "2025-03-03", "2025-03-04"]
            .into_iter()
            .map(day)
            .collect();
        assert_eq!(current_streak(&days, day("2025-03-04")), 2);
        assert_eq!(current_streak(&days, day("2025-03-06")), 0);
    }

    #[test]
    fn test_sample_tips_distinct() {
        let tips = sample_tips(4);
        assert_eq!(tips.len(), 4);
        let titles: BTreeSet<_> = tips.iter().map(|t| t.title).collect();
        assert_eq!(titles.len(), 4);

        assert_eq!(sample_tips(50).len(), CODING_TIPS.len());
    }

    #[test]
    fn test_quick_room_link_format() {
        let (room, url) = quick_room_link("https://editor.example/", "ada lovelace", "debug");
        assert_eq!(
            url,
            format!(
                "https://editor.example/editor/{}?username=ada%20lovelace&from=debug",
                room.simple()
            )
        );
    }

    #[test]
    fn test_file_editor_link() {
        let room = Uuid::new_v4();
        let url = file_editor_link("http://localhost:5000", "bob", room);
        assert!(url.ends_with(&format!("/editor/{}?username=bob", room.simple())));
    }
}
