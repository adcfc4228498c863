use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single stage within a pipeline run.
///
/// Each stage flows through: PENDING → RUNNING → COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    /// Whether moving from `self` to `next` is a legal forward transition.
    ///
    /// Only `Pending → Running` and `Running → Completed | Failed` are allowed;
    /// nothing ever moves backwards and `Completed`/`Failed` are final.
    pub fn can_advance_to(self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Pending, StageStatus::Running)
                | (StageStatus::Running, StageStatus::Completed)
                | (StageStatus::Running, StageStatus::Failed)
        )
    }

    /// `Completed` or `Failed`.
    pub fn is_finished(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "PENDING"),
            StageStatus::Running => write!(f, "RUNNING"),
            StageStatus::Completed => write!(f, "COMPLETED"),
            StageStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One descriptive entry of a stage's inputs, actions or outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailItem {
    pub title: String,
    pub description: String,
    /// Label of the external service doing the work, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl DetailItem {
    fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            service: None,
        }
    }

    fn with_service(title: &str, description: &str, service: &str) -> Self {
        Self {
            service: Some(service.to_string()),
            ..Self::new(title, description)
        }
    }
}

/// Static description of one pipeline step. The engine never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub id: u32,
    pub title: String,
    pub subtitle: String,
    pub inputs: Vec<DetailItem>,
    pub actions: Vec<DetailItem>,
    pub outputs: Vec<DetailItem>,
}

/// A stage as it exists inside one job: its definition plus live status.
///
/// Serializes flat, so the wire shape is the definition's fields with a
/// `status` field alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(flatten)]
    pub definition: StageDefinition,
    pub status: StageStatus,
}

impl Stage {
    pub fn pending(definition: StageDefinition) -> Self {
        Self {
            definition,
            status: StageStatus::Pending,
        }
    }

    pub fn id(&self) -> u32 {
        self.definition.id
    }

    pub fn title(&self) -> &str {
        &self.definition.title
    }
}

static CATALOG: LazyLock<Vec<StageDefinition>> = LazyLock::new(|| {
    vec![
        StageDefinition {
            id: 1,
            title: "Step 1: Understanding the Original Video".into(),
            subtitle: "Breaking it Down".into(),
            inputs: vec![DetailItem::new(
                "Original Video",
                "The video we want to remix, taken from secure storage.",
            )],
            actions: vec![
                DetailItem::with_service(
                    "Find the Scenes",
                    "Analyze the video to identify every scene change.",
                    "Video Intelligence API",
                ),
                DetailItem::with_service(
                    "Figure Out the Story",
                    "Describe each scene and the overall mood to understand the vibe.",
                    "Gemini 2.5 Flash",
                ),
            ],
            outputs: vec![DetailItem::new(
                "Story Blueprint",
                "A file that maps out the timing, scenes, and emotions of the video.",
            )],
        },
        StageDefinition {
            id: 2,
            title: "Step 2: Writing a New Script".into(),
            subtitle: "Getting Creative".into(),
            inputs: vec![DetailItem::new(
                "Story Blueprint",
                "The plan created in the last step.",
            )],
            actions: vec![
                DetailItem::with_service(
                    "Create a New Story",
                    "Write a new, creative script based on the original video's structure.",
                    "Gemini 2.5 Flash",
                ),
                DetailItem::new(
                    "Apply a Character Style",
                    "Give the new script a fun personality, like a \"Cyberpunk Shogun\".",
                ),
            ],
            outputs: vec![DetailItem::new(
                "The New Script",
                "The final script with new dialogue and scene descriptions.",
            )],
        },
        StageDefinition {
            id: 3,
            title: "Step 3: Creating the Video Clips".into(),
            subtitle: "Lights, Camera, Action!".into(),
            inputs: vec![DetailItem::new(
                "The New Script",
                "The script written in Step 2.",
            )],
            actions: vec![
                DetailItem::with_service(
                    "Design the First Frame",
                    "Create a starting image for each new scene to guide the AI.",
                    "Imagen 3",
                ),
                DetailItem::with_service(
                    "Generate Video Clips",
                    "Turn the starting frames into action-packed video clips.",
                    "Veo",
                ),
            ],
            outputs: vec![DetailItem::new(
                "Folder of New Video Clips",
                "A collection of brand-new video clips stored securely.",
            )],
        },
        StageDefinition {
            id: 4,
            title: "Step 4: Putting It All Together".into(),
            subtitle: "The Final Cut".into(),
            inputs: vec![
                DetailItem::new(
                    "Folder of New Video Clips",
                    "All the clips generated in the previous step.",
                ),
                DetailItem::new("The New Script", "Used to create the voiceover."),
            ],
            actions: vec![
                DetailItem::with_service(
                    "Stitch Clips into a Video",
                    "Edit all the clips together to create the final videos.",
                    "GKE",
                ),
                DetailItem::new(
                    "Add Voiceover",
                    "Generate a voiceover from the script and add it to the video.",
                ),
            ],
            outputs: vec![
                DetailItem::new(
                    "YouTube Version (16:9)",
                    "A widescreen video for cinematic viewing.",
                ),
                DetailItem::new(
                    "TikTok/Reels Version (9:16)",
                    "A tall video perfect for social media.",
                ),
                DetailItem::new(
                    "Instagram Version (1:1)",
                    "A square video for posts and feeds.",
                ),
            ],
        },
        StageDefinition {
            id: 5,
            title: "Step 5: Ready for the World!".into(),
            subtitle: "Checking Our Work".into(),
            inputs: vec![DetailItem::new(
                "The Whole AI Process",
                "The complete, repeatable recipe for making these videos.",
            )],
            actions: vec![
                DetailItem::new(
                    "Package the AI",
                    "Bundle the entire process so it can be run with a single click.",
                ),
                DetailItem::with_service(
                    "Track Performance and Cost",
                    "Set up dashboards to monitor how fast and efficiently the AI is working.",
                    "BigQuery",
                ),
            ],
            outputs: vec![
                DetailItem::new(
                    "Cost Report",
                    "A live dashboard showing how much it costs to run the AI.",
                ),
                DetailItem::new(
                    "Technical Log File",
                    "Detailed notes for our engineers to review.",
                ),
            ],
        },
    ]
});

/// The fixed, ordered stage definitions every job runs through.
///
/// Built once on first access and shared for the life of the process.
pub fn catalog() -> &'static [StageDefinition] {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_five_ordered_stages() {
        let ids: Vec<u32> = catalog().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn forward_transitions_only() {
        use StageStatus::*;
        assert!(Pending.can_advance_to(Running));
        assert!(Running.can_advance_to(Completed));
        assert!(Running.can_advance_to(Failed));

        assert!(!Pending.can_advance_to(Completed));
        assert!(!Pending.can_advance_to(Failed));
        assert!(!Running.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Running));
        assert!(!Failed.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Completed));
    }

    #[test]
    fn status_serializes_as_upper_case_literal() {
        assert_eq!(
            serde_json::to_string(&StageStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        let parsed: StageStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(parsed, StageStatus::Running);
        assert_eq!(StageStatus::Failed.to_string(), "FAILED");
    }

    #[test]
    fn stage_serializes_flat_with_status() {
        let stage = Stage::pending(catalog()[0].clone());
        let value = serde_json::to_value(&stage).unwrap();

        assert_eq!(value["id"], 1);
        assert_eq!(value["subtitle"], "Breaking it Down");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["actions"][0]["service"], "Video Intelligence API");
        // Items without a service label omit the field entirely.
        assert!(value["inputs"][0].get("service").is_none());
    }
}
