use crate::pipeline::PipelineError;
use serde::{Deserialize, Serialize};
use simbatch_ins::Factor;

const BASE_NAME: &str = "base";

/// A parameter name and the values it takes across simulations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValues {
    pub name: String,
    pub values: Vec<String>,
}

impl ParameterValues {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn factor(&self, index: usize) -> Result<Factor, PipelineError> {
        let value = self.values.get(index).ok_or_else(|| {
            PipelineError::Validation(format!(
                "parameter '{}' has no value at index {index}",
                self.name
            ))
        })?;
        Ok(Factor::parse(&self.name, value.clone())?)
    }

    pub fn factors(&self) -> Result<Vec<Factor>, PipelineError> {
        (0..self.values.len())
            .map(|index| self.factor(index))
            .collect()
    }
}

/// Parameters whose values are selected together by a shared index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterGroup {
    name: String,
    parameters: Vec<ParameterValues>,
}

impl ParameterGroup {
    pub fn new(
        name: impl Into<String>,
        parameters: Vec<ParameterValues>,
    ) -> Result<Self, PipelineError> {
        let name = name.into();
        let Some(first) = parameters.first() else {
            return Err(PipelineError::Validation(format!(
                "parameter group '{name}' has no parameters"
            )));
        };
        let expected = first.values.len();
        if expected == 0 {
            return Err(PipelineError::Validation(format!(
                "parameter group '{name}' has no values"
            )));
        }
        if let Some(mismatch) = parameters
            .iter()
            .find(|parameter| parameter.values.len() != expected)
        {
            return Err(PipelineError::GroupLength {
                group: name,
                parameter: mismatch.name.clone(),
                expected,
                found: mismatch.values.len(),
            });
        }
        Ok(Self { name, parameters })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterValues] {
        &self.parameters
    }

    pub fn value_count(&self) -> usize {
        self.parameters
            .first()
            .map(|parameter| parameter.values.len())
            .unwrap_or(0)
    }

    pub fn factors_for_index(&self, index: usize) -> Result<Vec<Factor>, PipelineError> {
        self.parameters
            .iter()
            .map(|parameter| parameter.factor(index))
            .collect()
    }

    /// The members at `index` as a single composite factor.
    pub fn factor_for_index(&self, index: usize) -> Result<Factor, PipelineError> {
        Ok(Factor::Composite {
            factors: self.factors_for_index(index)?,
        })
    }
}

/// One dimension of the factor space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorAxis {
    Values(ParameterValues),
    Group(ParameterGroup),
}

impl FactorAxis {
    pub fn name(&self) -> &str {
        match self {
            FactorAxis::Values(values) => &values.name,
            FactorAxis::Group(group) => group.name(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FactorAxis::Values(values) => values.values.len(),
            FactorAxis::Group(group) => group.value_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn alternatives(&self) -> Result<Vec<Factor>, PipelineError> {
        match self {
            FactorAxis::Values(values) => values.factors(),
            FactorAxis::Group(group) => (0..group.value_count())
                .map(|index| group.factor_for_index(index))
                .collect(),
        }
    }
}

/// One concrete simulation variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factorial {
    factors: Vec<Factor>,
}

impl Factorial {
    pub fn new(factors: Vec<Factor>) -> Self {
        Self { factors }
    }

    pub fn base() -> Self {
        Self::default()
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn is_base(&self) -> bool {
        self.factors.is_empty()
    }

    /// Factor labels joined with `-`, or `base` when nothing is overridden.
    pub fn name(&self) -> String {
        if self.factors.is_empty() {
            return BASE_NAME.to_string();
        }
        self.factors
            .iter()
            .map(Factor::label)
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// Expands factor axes into simulations: the cartesian product when
/// `full_factorial` is set (first axis varies slowest), otherwise one
/// simulation per value of every axis.
pub fn expand(axes: &[FactorAxis], full_factorial: bool) -> Result<Vec<Factorial>, PipelineError> {
    if axes.is_empty() {
        return Ok(vec![Factorial::base()]);
    }
    if let Some(empty) = axes.iter().find(|axis| axis.is_empty()) {
        return Err(PipelineError::Validation(format!(
            "factor '{}' has no values",
            empty.name()
        )));
    }

    let alternatives = axes
        .iter()
        .map(FactorAxis::alternatives)
        .collect::<Result<Vec<_>, _>>()?;

    if !full_factorial {
        return Ok(alternatives
            .into_iter()
            .flatten()
            .map(|factor| Factorial::new(vec![factor]))
            .collect());
    }

    let mut combinations: Vec<Vec<Factor>> = vec![Vec::new()];
    for axis in &alternatives {
        combinations = combinations
            .into_iter()
            .flat_map(|prefix| {
                axis.iter().map(move |factor| {
                    let mut next = prefix.clone();
                    next.push(factor.clone());
                    next
                })
            })
            .collect();
    }
    Ok(combinations.into_iter().map(Factorial::new).collect())
}
