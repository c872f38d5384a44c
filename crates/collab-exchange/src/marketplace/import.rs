//! Bulk demand creation from a CSV export. Every row goes through
//! [`DemandLifecycle::publish`], so escrow and notifications behave exactly as for a
//! demand created by hand.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use super::domain::{Actor, DemandDraft, DemandId, RewardType, Urgency};
use super::lifecycle::DemandLifecycle;
use super::ErrorKind;

#[derive(Debug)]
pub enum DemandImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for DemandImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemandImportError::Io(err) => write!(f, "failed to read demand export: {}", err),
            DemandImportError::Csv(err) => write!(f, "invalid demand CSV data: {}", err),
        }
    }
}

impl std::error::Error for DemandImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DemandImportError::Io(err) => Some(err),
            DemandImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for DemandImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for DemandImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// A row that parsed but could not be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based data row, excluding the header.
    pub row: usize,
    pub title: String,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub published: Vec<DemandId>,
    pub rejected: Vec<RejectedRow>,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.published.len() + self.rejected.len()
    }
}

pub struct DemandImporter;

impl DemandImporter {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        lifecycle: &DemandLifecycle,
        creator: &Actor,
    ) -> Result<ImportSummary, DemandImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, lifecycle, creator)
    }

    /// Malformed CSV aborts the whole import; rows already published stay published.
    pub fn from_reader<R: Read>(
        reader: R,
        lifecycle: &DemandLifecycle,
        creator: &Actor,
    ) -> Result<ImportSummary, DemandImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut summary = ImportSummary::default();

        for (index, record) in csv_reader.deserialize::<DemandRow>().enumerate() {
            let row = record?;
            let number = index + 1;
            let title = row.title.clone();

            let draft = match row.into_draft() {
                Ok(draft) => draft,
                Err(reason) => {
                    warn!(row = number, %reason, "skipping malformed demand row");
                    summary.rejected.push(RejectedRow {
                        row: number,
                        title,
                        kind: ErrorKind::InvalidInput,
                        reason,
                    });
                    continue;
                }
            };

            match lifecycle.publish(creator, draft) {
                Ok(demand) => summary.published.push(demand.id),
                Err(error) => {
                    warn!(row = number, %error, "demand row rejected by lifecycle");
                    summary.rejected.push(RejectedRow {
                        row: number,
                        title,
                        kind: error.kind(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(
            creator = %creator.user_id,
            published = summary.published.len(),
            rejected = summary.rejected.len(),
            "demand import finished"
        );
        Ok(summary)
    }
}

#[derive(Debug, Deserialize)]
struct DemandRow {
    title: String,
    #[serde(default)]
    description: String,
    reward_type: String,
    reward_value: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    urgency: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    tags: Option<String>,
    #[serde(default)]
    customer_info: String,
}

impl DemandRow {
    fn into_draft(self) -> Result<DemandDraft, String> {
        let reward_type = match self.reward_type.to_ascii_lowercase().as_str() {
            "points" => RewardType::Points,
            "amount" => RewardType::Amount,
            other => return Err(format!("unknown reward type '{other}'")),
        };
        let reward_value = self
            .reward_value
            .parse::<u64>()
            .map_err(|err| format!("invalid reward value '{}' ({err})", self.reward_value))?;
        let urgency = match self.urgency.as_deref() {
            None => Urgency::Normal,
            Some(raw) => Urgency::parse(raw).ok_or_else(|| format!("unknown urgency '{raw}'"))?,
        };
        let tags = self
            .tags
            .as_deref()
            .map(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(DemandDraft {
            title: self.title,
            description: self.description,
            customer_info: self.customer_info,
            tags,
            urgency,
            reward_type,
            reward_value,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(reward_type: &str, reward_value: &str, urgency: Option<&str>) -> DemandRow {
        DemandRow {
            title: "Translate brochure".to_string(),
            description: String::new(),
            reward_type: reward_type.to_string(),
            reward_value: reward_value.to_string(),
            urgency: urgency.map(str::to_string),
            tags: Some("design; ; print".to_string()),
            customer_info: String::new(),
        }
    }

    #[test]
    fn converts_rows_into_drafts() {
        let draft = row("Points", "250", Some("urgent")).into_draft().expect("valid row");
        assert_eq!(draft.reward_type, RewardType::Points);
        assert_eq!(draft.reward_value, 250);
        assert_eq!(draft.urgency, Urgency::Urgent);
        assert_eq!(draft.tags, vec!["design".to_string(), "print".to_string()]);
    }

    #[test]
    fn reports_bad_reward_terms() {
        assert!(row("karma", "10", None).into_draft().is_err());
        assert!(row("points", "-5", None).into_draft().is_err());
        assert!(row("points", "5", Some("whenever")).into_draft().is_err());
    }
}
