use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::scoring::FileScore;

/// Task, language and file variant a ranking is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub task: String,
    pub language: String,
    pub variant: String,
}

impl TaskKey {
    pub fn of(score: &FileScore) -> Self {
        Self {
            task: score.context.task.dir_name().to_string(),
            language: score.context.language.code().to_string(),
            variant: score.context.variant(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.task, self.language, self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRankingEntry {
    #[serde(rename = "Task_Key")]
    pub task_key: String,
    #[serde(rename = "Rank")]
    pub rank: usize,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Score")]
    pub score: Option<f64>,
    #[serde(rename = "Success_Score")]
    pub success_score: Option<f64>,
    #[serde(rename = "Success_Rate")]
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallRankingEntry {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Overall_Rank")]
    pub overall_rank: usize,
    #[serde(rename = "Average_Rank")]
    pub average_rank: f64,
    #[serde(rename = "Total_Score")]
    pub total_score: usize,
    #[serde(rename = "Tasks_Evaluated")]
    pub tasks_evaluated: usize,
}

/// A model that was not ranked on every task key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialModel {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Tasks_Evaluated")]
    pub tasks_evaluated: usize,
    #[serde(rename = "Tasks_Missing")]
    pub tasks_missing: Vec<String>,
    #[serde(rename = "Average_Rank")]
    pub average_rank: Option<f64>,
}

/// A scored file left out of its task ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrankedEntry {
    #[serde(rename = "Task_Key")]
    pub task_key: String,
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Reason")]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rankings {
    pub per_task: BTreeMap<TaskKey, Vec<TaskRankingEntry>>,
    pub overall: Vec<OverallRankingEntry>,
    pub partial: Vec<PartialModel>,
    pub unranked: Vec<UnrankedEntry>,
}

impl Rankings {
    pub fn task_rows(&self) -> Vec<TaskRankingEntry> {
        self.per_task.values().flatten().cloned().collect()
    }

    pub fn canonical_keys(&self) -> Vec<String> {
        self.per_task.keys().map(ToString::to_string).collect()
    }
}

/// Descending by value, undefined values last.
fn desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ordering within one task: all-examples score, then success-only score,
/// then success rate, then model name.
fn compare_entries(a: &FileScore, b: &FileScore) -> Ordering {
    desc(a.primary_all(), b.primary_all())
        .then_with(|| desc(a.primary_success(), b.primary_success()))
        .then_with(|| b.success_rate().total_cmp(&a.success_rate()))
        .then_with(|| a.context.model.cmp(&b.context.model))
}

/// Ranks models per task key and overall.
///
/// A file whose primary success score is undefined (no successful
/// extraction) is left out of its task ranking. Canonical keys are the keys
/// with at least one ranked entry, so such a file makes its model partial
/// only when some other model was ranked on that key.
pub fn rank_models(scores: &[FileScore]) -> Rankings {
    let mut grouped: BTreeMap<TaskKey, Vec<&FileScore>> = BTreeMap::new();
    let mut rankings = Rankings::default();

    for score in scores {
        let key = TaskKey::of(score);
        if score.primary_success().is_none() || score.primary_all().is_none() {
            rankings.unranked.push(UnrankedEntry {
                task_key: key.to_string(),
                model: score.context.model.clone(),
                reason: "no successfully extracted answers".to_string(),
            });
            continue;
        }
        let group = grouped.entry(key.clone()).or_default();
        if group.iter().any(|s| s.context.model == score.context.model) {
            tracing::warn!(task_key = %key, model = %score.context.model, "duplicate result file ignored");
            continue;
        }
        group.push(score);
    }

    // model -> key -> (rank, models in task)
    let mut model_ranks: BTreeMap<String, BTreeMap<TaskKey, (usize, usize)>> = BTreeMap::new();

    for (key, mut group) in grouped {
        group.sort_by(|a, b| compare_entries(a, b));
        let n = group.len();
        let entries: Vec<TaskRankingEntry> = group
            .iter()
            .enumerate()
            .map(|(idx, s)| {
                model_ranks
                    .entry(s.context.model.clone())
                    .or_default()
                    .insert(key.clone(), (idx + 1, n));
                TaskRankingEntry {
                    task_key: key.to_string(),
                    rank: idx + 1,
                    model: s.context.model.clone(),
                    metric: s.primary.to_string(),
                    score: s.primary_all(),
                    success_score: s.primary_success(),
                    success_rate: s.success_rate(),
                }
            })
            .collect();
        rankings.per_task.insert(key, entries);
    }

    let canonical: BTreeSet<&TaskKey> = rankings.per_task.keys().collect();
    let mut models: BTreeSet<String> = model_ranks.keys().cloned().collect();
    models.extend(rankings.unranked.iter().map(|u| u.model.clone()));

    let mut full = Vec::new();
    for model in models {
        let ranks = model_ranks.get(&model);
        let evaluated = ranks.map(|r| r.len()).unwrap_or(0);
        let average_rank = ranks
            .filter(|r| !r.is_empty())
            .map(|r| r.values().map(|(rank, _)| *rank as f64).sum::<f64>() / r.len() as f64);

        if evaluated == canonical.len() && evaluated > 0 {
            let total_score = ranks
                .map(|r| r.values().map(|(rank, n)| n - rank + 1).sum::<usize>())
                .unwrap_or(0);
            full.push(OverallRankingEntry {
                model,
                overall_rank: 0,
                average_rank: average_rank.unwrap_or(0.0),
                total_score,
                tasks_evaluated: evaluated,
            });
        } else {
            let tasks_missing = canonical
                .iter()
                .filter(|k| ranks.map_or(true, |r| !r.contains_key(**k)))
                .map(|k| k.to_string())
                .collect();
            rankings.partial.push(PartialModel {
                model,
                tasks_evaluated: evaluated,
                tasks_missing,
                average_rank,
            });
        }
    }

    full.sort_by(|a, b| {
        a.average_rank
            .total_cmp(&b.average_rank)
            .then_with(|| b.total_score.cmp(&a.total_score))
            .then_with(|| a.model.cmp(&b.model))
    });
    for (idx, entry) in full.iter_mut().enumerate() {
        entry.overall_rank = idx + 1;
    }
    rankings.overall = full;
    rankings
}
