use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    DependsOn,
    FollowsPattern,
    GovernedBy,
    FixedBy,
    ExemplifiedBy,
    RejectedInFavorOf,
    ServesVision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub from: String,
    pub to: String,
    #[serde(rename = "relationType")]
    pub relation_type: RelationType,
}

impl Relation {
    pub fn new(from: impl Into<String>, to: impl Into<String>, relation_type: RelationType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation_type,
        }
    }
}
