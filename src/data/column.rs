//! Typed, column-major value storage.
//!
//! Missing values are represented by dedicated sentinels per semantic and
//! are never imputed at this layer: NaN for numerical columns,
//! [`MISSING_CATEGORICAL`] for categorical codes, [`MISSING_BOOLEAN`] for
//! booleans.

use super::dictionary::{Dictionary, OOV_CODE};

/// Missing-value sentinel for categorical codes.
pub const MISSING_CATEGORICAL: u32 = u32::MAX;

/// Missing-value sentinel for boolean values (stored values are 0/1).
pub const MISSING_BOOLEAN: u8 = 2;

/// Column semantic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnSemantic {
    /// Continuous values.
    Numerical,
    /// Dictionary-encoded single category.
    Categorical,
    /// Opaque 64-bit keys (ranking groups). Not splittable.
    Hash,
    /// True/false.
    Boolean,
    /// Dictionary-encoded sets of categories. Stored but not splittable.
    CategoricalSet,
}

impl ColumnSemantic {
    /// Semantic name as used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            ColumnSemantic::Numerical => "NUMERICAL",
            ColumnSemantic::Categorical => "CATEGORICAL",
            ColumnSemantic::Hash => "HASH",
            ColumnSemantic::Boolean => "BOOLEAN",
            ColumnSemantic::CategoricalSet => "CATEGORICAL_SET",
        }
    }

    /// Returns true if the split evaluator can search this column for
    /// conditions. Hash columns are identities, not ordered or enumerable
    /// values; set-valued columns are carried but never split on.
    pub fn is_splittable(self) -> bool {
        matches!(
            self,
            ColumnSemantic::Numerical | ColumnSemantic::Categorical | ColumnSemantic::Boolean
        )
    }
}

impl std::fmt::Display for ColumnSemantic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoded values of one column.
#[derive(Clone, Debug)]
pub enum ColumnValues {
    /// One f32 per example; NaN marks a missing value.
    Numerical(Vec<f32>),
    /// One dictionary code per example; [`MISSING_CATEGORICAL`] marks a
    /// missing value.
    Categorical { codes: Vec<u32>, dictionary: Dictionary },
    /// 0/1 per example; [`MISSING_BOOLEAN`] marks a missing value.
    Boolean(Vec<u8>),
    /// One 64-bit key per example.
    Hash(Vec<u64>),
    /// A sorted set of dictionary codes per example.
    CategoricalSet { sets: Vec<Vec<u32>>, dictionary: Dictionary },
}

/// A named, typed column.
#[derive(Clone, Debug)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    /// A numerical column. NaN entries are missing.
    pub fn numerical(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self { name: name.into(), values: ColumnValues::Numerical(values) }
    }

    /// A categorical column from raw tokens, building its dictionary.
    ///
    /// `None` entries are missing. `min_vocab_frequency` and
    /// `max_vocab_count` follow the [`Dictionary::build`] policy.
    pub fn categorical_from_tokens(
        name: impl Into<String>,
        tokens: &[Option<&str>],
        min_vocab_frequency: u32,
        max_vocab_count: i32,
    ) -> Self {
        let dictionary = Dictionary::build(
            tokens.iter().filter_map(|t| *t),
            min_vocab_frequency,
            max_vocab_count,
        );
        let codes = tokens
            .iter()
            .map(|t| match t {
                Some(token) => dictionary.code(token),
                None => MISSING_CATEGORICAL,
            })
            .collect();
        Self {
            name: name.into(),
            values: ColumnValues::Categorical { codes, dictionary },
        }
    }

    /// A categorical column from pre-encoded codes and a frozen dictionary.
    pub fn categorical(name: impl Into<String>, codes: Vec<u32>, dictionary: Dictionary) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Categorical { codes, dictionary },
        }
    }

    /// A boolean column. `None` entries are missing.
    pub fn boolean(name: impl Into<String>, values: &[Option<bool>]) -> Self {
        let encoded = values
            .iter()
            .map(|v| match v {
                Some(true) => 1,
                Some(false) => 0,
                None => MISSING_BOOLEAN,
            })
            .collect();
        Self { name: name.into(), values: ColumnValues::Boolean(encoded) }
    }

    /// A hash column (group identities).
    pub fn hash(name: impl Into<String>, values: Vec<u64>) -> Self {
        Self { name: name.into(), values: ColumnValues::Hash(values) }
    }

    /// A categorical-set column from raw token sets.
    pub fn categorical_set_from_tokens(
        name: impl Into<String>,
        token_sets: &[Vec<&str>],
        min_vocab_frequency: u32,
        max_vocab_count: i32,
    ) -> Self {
        let dictionary = Dictionary::build(
            token_sets.iter().flatten().copied(),
            min_vocab_frequency,
            max_vocab_count,
        );
        let sets = token_sets
            .iter()
            .map(|tokens| {
                let mut codes: Vec<u32> = tokens.iter().map(|t| dictionary.code(t)).collect();
                codes.sort_unstable();
                codes.dedup();
                codes
            })
            .collect();
        Self {
            name: name.into(),
            values: ColumnValues::CategoricalSet { sets, dictionary },
        }
    }

    /// Column name, unique within a dataset.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column semantic.
    pub fn semantic(&self) -> ColumnSemantic {
        match &self.values {
            ColumnValues::Numerical(_) => ColumnSemantic::Numerical,
            ColumnValues::Categorical { .. } => ColumnSemantic::Categorical,
            ColumnValues::Boolean(_) => ColumnSemantic::Boolean,
            ColumnValues::Hash(_) => ColumnSemantic::Hash,
            ColumnValues::CategoricalSet { .. } => ColumnSemantic::CategoricalSet,
        }
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        match &self.values {
            ColumnValues::Numerical(v) => v.len(),
            ColumnValues::Categorical { codes, .. } => codes.len(),
            ColumnValues::Boolean(v) => v.len(),
            ColumnValues::Hash(v) => v.len(),
            ColumnValues::CategoricalSet { sets, .. } => sets.len(),
        }
    }

    /// Returns true if the column has no examples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw values access.
    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    /// Numerical values, if this is a numerical column.
    pub fn as_numerical(&self) -> Option<&[f32]> {
        match &self.values {
            ColumnValues::Numerical(v) => Some(v),
            _ => None,
        }
    }

    /// Categorical codes, if this is a categorical column.
    pub fn as_categorical(&self) -> Option<&[u32]> {
        match &self.values {
            ColumnValues::Categorical { codes, .. } => Some(codes),
            _ => None,
        }
    }

    /// Boolean values, if this is a boolean column.
    pub fn as_boolean(&self) -> Option<&[u8]> {
        match &self.values {
            ColumnValues::Boolean(v) => Some(v),
            _ => None,
        }
    }

    /// Hash keys, if this is a hash column.
    pub fn as_hash(&self) -> Option<&[u64]> {
        match &self.values {
            ColumnValues::Hash(v) => Some(v),
            _ => None,
        }
    }

    /// Dictionary, for categorical and categorical-set columns.
    pub fn dictionary(&self) -> Option<&Dictionary> {
        match &self.values {
            ColumnValues::Categorical { dictionary, .. }
            | ColumnValues::CategoricalSet { dictionary, .. } => Some(dictionary),
            _ => None,
        }
    }

    /// Categorical code of `example`, mapping missing to the OOV sentinel.
    ///
    /// Split evaluation and routing treat a missing category as OOV; storage
    /// keeps them distinct.
    #[inline]
    pub fn categorical_code_or_oov(&self, example: usize) -> Option<u32> {
        let codes = self.as_categorical()?;
        let code = codes[example];
        Some(if code == MISSING_CATEGORICAL { OOV_CODE } else { code })
    }
}
