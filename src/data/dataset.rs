//! The immutable dataset: ordered columns plus role assignment.

use std::collections::HashMap;

use crate::config::ColumnRole;

use super::column::{Column, ColumnSemantic};

/// Dataset/column inconsistency, raised at dataset-construction time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// Two columns disagree on the example count.
    #[error("column {name:?} has {got} examples, expected {expected}")]
    InconsistentRows { name: String, expected: usize, got: usize },

    /// Two columns share a name.
    #[error("duplicate column name {name:?}")]
    DuplicateColumn { name: String },

    /// A role references a column that does not exist.
    #[error("column {name:?} assigned as {role} is not present")]
    MissingColumn { name: String, role: ColumnRole },

    /// An explicitly listed feature does not exist.
    #[error("feature column {name:?} is not present")]
    UnknownFeature { name: String },

    /// A column serves both as a feature and as a role column, or as two
    /// roles at once.
    #[error("column {name:?} cannot be both {role} and an input feature")]
    RoleFeatureCollision { name: String, role: ColumnRole },

    /// A role column has an incompatible semantic.
    #[error("column {name:?} assigned as {role} must be {expected}, got {got}")]
    RoleSemantic {
        name: String,
        role: ColumnRole,
        expected: &'static str,
        got: ColumnSemantic,
    },

    /// The dataset has no columns.
    #[error("a dataset requires at least one column")]
    Empty,
}

/// An immutable, column-major dataset.
///
/// Built once from columns plus a role assignment; owned by the training
/// run that created it and shared read-only across worker threads.
#[derive(Clone, Debug)]
pub struct Dataset {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,
    num_examples: usize,
    label: usize,
    weight: Option<usize>,
    ranking_group: Option<usize>,
    uplift_treatment: Option<usize>,
    /// Columns usable as split candidates: splittable semantic, no role.
    feature_ids: Vec<u32>,
}

impl Dataset {
    /// Start building a dataset.
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Number of examples. Every column has exactly this many.
    #[inline]
    pub fn num_examples(&self) -> usize {
        self.num_examples
    }

    /// Number of columns, including role columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Column by id. O(1).
    #[inline]
    pub fn column(&self, id: u32) -> &Column {
        &self.columns[id as usize]
    }

    /// Column id by name.
    pub fn column_id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).map(|&id| id as u32)
    }

    /// Column by name.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.by_name.get(name).map(|&id| &self.columns[id])
    }

    /// Ids of feature columns (splittable, no role), ascending.
    pub fn feature_ids(&self) -> &[u32] {
        &self.feature_ids
    }

    /// The label column.
    pub fn label_column(&self) -> &Column {
        &self.columns[self.label]
    }

    /// The column serving `role`, if assigned.
    pub fn role_column(&self, role: ColumnRole) -> Option<&Column> {
        let id = match role {
            ColumnRole::Label => Some(self.label),
            ColumnRole::Weight => self.weight,
            ColumnRole::RankingGroup => self.ranking_group,
            ColumnRole::UpliftTreatment => self.uplift_treatment,
        }?;
        Some(&self.columns[id])
    }

    /// Per-example weights, if a weight column is assigned.
    pub fn weights(&self) -> Option<&[f32]> {
        self.weight.map(|id| {
            self.columns[id]
                .as_numerical()
                .expect("weight semantic checked at build")
        })
    }

    /// Ranking group keys, if a ranking-group column is assigned.
    pub fn group_keys(&self) -> Option<&[u64]> {
        self.ranking_group.map(|id| {
            self.columns[id]
                .as_hash()
                .expect("ranking group semantic checked at build")
        })
    }

    /// The uplift-treatment column, if assigned.
    pub fn treatment_column(&self) -> Option<&Column> {
        self.uplift_treatment.map(|id| &self.columns[id])
    }
}

/// Builder for [`Dataset`].
///
/// Columns not assigned a role and with a splittable semantic become
/// features. An explicit feature list may be given instead; naming a role
/// column in it is a [`SchemaError::RoleFeatureCollision`].
#[derive(Default)]
pub struct DatasetBuilder {
    columns: Vec<Column>,
    label: Option<String>,
    weight: Option<String>,
    ranking_group: Option<String>,
    uplift_treatment: Option<String>,
    explicit_features: Option<Vec<String>>,
}

impl DatasetBuilder {
    /// Append a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Assign the label column.
    pub fn label(mut self, name: impl Into<String>) -> Self {
        self.label = Some(name.into());
        self
    }

    /// Assign the weight column.
    pub fn weight(mut self, name: impl Into<String>) -> Self {
        self.weight = Some(name.into());
        self
    }

    /// Assign the ranking-group column.
    pub fn ranking_group(mut self, name: impl Into<String>) -> Self {
        self.ranking_group = Some(name.into());
        self
    }

    /// Assign the uplift-treatment column.
    pub fn uplift_treatment(mut self, name: impl Into<String>) -> Self {
        self.uplift_treatment = Some(name.into());
        self
    }

    /// Restrict features to an explicit list of column names.
    pub fn features(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.explicit_features = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and freeze the dataset.
    pub fn build(self) -> Result<Dataset, SchemaError> {
        if self.columns.is_empty() {
            return Err(SchemaError::Empty);
        }

        let num_examples = self.columns[0].len();
        let mut by_name = HashMap::with_capacity(self.columns.len());
        for (id, column) in self.columns.iter().enumerate() {
            if column.len() != num_examples {
                return Err(SchemaError::InconsistentRows {
                    name: column.name().to_string(),
                    expected: num_examples,
                    got: column.len(),
                });
            }
            if by_name.insert(column.name().to_string(), id).is_some() {
                return Err(SchemaError::DuplicateColumn { name: column.name().to_string() });
            }
        }

        let resolve = |name: &Option<String>, role: ColumnRole| -> Result<Option<usize>, SchemaError> {
            match name {
                None => Ok(None),
                Some(name) => by_name
                    .get(name.as_str())
                    .copied()
                    .map(Some)
                    .ok_or_else(|| SchemaError::MissingColumn { name: name.clone(), role }),
            }
        };

        let label = resolve(&self.label, ColumnRole::Label)?
            .ok_or_else(|| SchemaError::MissingColumn {
                name: self.label.clone().unwrap_or_default(),
                role: ColumnRole::Label,
            })?;
        let weight = resolve(&self.weight, ColumnRole::Weight)?;
        let ranking_group = resolve(&self.ranking_group, ColumnRole::RankingGroup)?;
        let uplift_treatment = resolve(&self.uplift_treatment, ColumnRole::UpliftTreatment)?;

        // An example may not serve two roles.
        let mut role_ids: Vec<(usize, ColumnRole)> = vec![(label, ColumnRole::Label)];
        for (id, role) in [
            (weight, ColumnRole::Weight),
            (ranking_group, ColumnRole::RankingGroup),
            (uplift_treatment, ColumnRole::UpliftTreatment),
        ] {
            if let Some(id) = id {
                if role_ids.iter().any(|(other, _)| *other == id) {
                    return Err(SchemaError::RoleFeatureCollision {
                        name: self.columns[id].name().to_string(),
                        role,
                    });
                }
                role_ids.push((id, role));
            }
        }

        // Role semantics.
        if let Some(id) = weight {
            let column = &self.columns[id];
            if column.semantic() != ColumnSemantic::Numerical {
                return Err(SchemaError::RoleSemantic {
                    name: column.name().to_string(),
                    role: ColumnRole::Weight,
                    expected: "NUMERICAL",
                    got: column.semantic(),
                });
            }
        }
        if let Some(id) = ranking_group {
            let column = &self.columns[id];
            if column.semantic() != ColumnSemantic::Hash {
                return Err(SchemaError::RoleSemantic {
                    name: column.name().to_string(),
                    role: ColumnRole::RankingGroup,
                    expected: "HASH",
                    got: column.semantic(),
                });
            }
        }
        if let Some(id) = uplift_treatment {
            let column = &self.columns[id];
            if !matches!(
                column.semantic(),
                ColumnSemantic::Categorical | ColumnSemantic::Boolean
            ) {
                return Err(SchemaError::RoleSemantic {
                    name: column.name().to_string(),
                    role: ColumnRole::UpliftTreatment,
                    expected: "CATEGORICAL or BOOLEAN",
                    got: column.semantic(),
                });
            }
        }

        let is_role = |id: usize| role_ids.iter().find(|(other, _)| *other == id).map(|(_, r)| *r);

        let feature_ids: Vec<u32> = match &self.explicit_features {
            None => self
                .columns
                .iter()
                .enumerate()
                .filter(|(id, column)| is_role(*id).is_none() && column.semantic().is_splittable())
                .map(|(id, _)| id as u32)
                .collect(),
            Some(names) => {
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    let id = *by_name
                        .get(name.as_str())
                        .ok_or_else(|| SchemaError::UnknownFeature { name: name.clone() })?;
                    if let Some(role) = is_role(id) {
                        return Err(SchemaError::RoleFeatureCollision { name: name.clone(), role });
                    }
                    if self.columns[id].semantic().is_splittable() {
                        ids.push(id as u32);
                    }
                }
                ids.sort_unstable();
                ids
            }
        };

        Ok(Dataset {
            columns: self.columns,
            by_name,
            num_examples,
            label,
            weight,
            ranking_group,
            uplift_treatment,
            feature_ids,
        })
    }
}
