//! Dense potentials over discrete variables.
//!
//! A [`Potential`] is a non-negative table over an ordered scope. Entries are
//! stored row-major with the last scope variable varying fastest, so a
//! conditional table `P(child | parents)` built with scope `parents ++ [child]`
//! keeps each conditional distribution contiguous.
//!
//! Supported operations mirror what message passing needs:
//! - `combine`: pointwise product over the union of two scopes
//! - `project`: sum out a subset of the scope
//! - `extract`: slice the table on a partial assignment
//! - `evaluate`: look up a full assignment
//! - `normalize`: rescale to total mass one

use rustc_hash::FxHashMap;

use crate::engine::errors::InferenceError;
use crate::engine::graph::NodeId;

/// Partial or complete assignment of values to variables.
pub type Assignment = FxHashMap<NodeId, usize>;

/// Tolerance used when checking that a table is normalized.
const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// A non-negative function from assignments of a scope to reals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Potential {
    scope: Vec<NodeId>,
    sizes: Vec<usize>,
    values: Vec<f64>,
}

impl Potential {
    /// Creates a potential from `(variable, domain size)` pairs and row-major values.
    pub fn new(scope: Vec<(NodeId, usize)>, values: Vec<f64>) -> Result<Self, InferenceError> {
        let (scope, sizes): (Vec<NodeId>, Vec<usize>) = scope.into_iter().unzip();
        for (idx, var) in scope.iter().enumerate() {
            if scope[..idx].contains(var) {
                return Err(InferenceError::InvalidPotential(format!(
                    "variable {:?} appears twice in scope",
                    var
                )));
            }
            if sizes[idx] == 0 {
                return Err(InferenceError::InvalidPotential(format!(
                    "variable {:?} has an empty domain",
                    var
                )));
            }
        }
        let expected: usize = sizes.iter().product();
        if values.len() != expected {
            return Err(InferenceError::InvalidPotential(format!(
                "scope {:?} needs {} entries, got {}",
                scope,
                expected,
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(InferenceError::InvalidPotential(format!(
                "entries must be finite and non-negative, found {}",
                bad
            )));
        }
        Ok(Self {
            scope,
            sizes,
            values,
        })
    }

    /// The unit potential (all entries one) over the given scope.
    pub fn ones(scope: &[(NodeId, usize)]) -> Self {
        let (scope, sizes): (Vec<NodeId>, Vec<usize>) = scope.iter().copied().unzip();
        let total: usize = sizes.iter().product();
        Self {
            scope,
            sizes,
            values: vec![1.0; total],
        }
    }

    /// A potential with empty scope holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self {
            scope: Vec::new(),
            sizes: Vec::new(),
            values: vec![value],
        }
    }

    /// Hard evidence: one at `value`, zero elsewhere.
    pub fn indicator(var: NodeId, size: usize, value: usize) -> Result<Self, InferenceError> {
        if value >= size {
            return Err(InferenceError::InvalidPotential(format!(
                "value {} out of range for {:?} with domain size {}",
                value, var, size
            )));
        }
        let mut values = vec![0.0; size];
        values[value] = 1.0;
        Self::new(vec![(var, size)], values)
    }

    /// Soft evidence: a likelihood vector over the domain of `var`.
    pub fn likelihood(var: NodeId, values: Vec<f64>) -> Result<Self, InferenceError> {
        let size = values.len();
        let potential = Self::new(vec![(var, size)], values)?;
        if potential.sum() <= 0.0 {
            return Err(InferenceError::InvalidPotential(format!(
                "likelihood for {:?} has no positive entry",
                var
            )));
        }
        Ok(potential)
    }

    pub fn scope(&self) -> &[NodeId] {
        &self.scope
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of table entries.
    pub fn num_entries(&self) -> usize {
        self.values.len()
    }

    pub fn contains(&self, var: NodeId) -> bool {
        self.scope.contains(&var)
    }

    pub fn domain_size(&self, var: NodeId) -> Option<usize> {
        self.position(var).map(|pos| self.sizes[pos])
    }

    /// Scope paired with domain sizes.
    pub fn variables(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        self.scope.iter().copied().zip(self.sizes.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    fn position(&self, var: NodeId) -> Option<usize> {
        self.scope.iter().position(|&v| v == var)
    }

    /// Pointwise product over the union of both scopes.
    ///
    /// The result keeps `self`'s variable order followed by the variables only
    /// `other` mentions.
    pub fn combine(&self, other: &Potential) -> Result<Potential, InferenceError> {
        let mut scope = self.scope.clone();
        let mut sizes = self.sizes.clone();
        for (var, size) in other.variables() {
            match self.position(var) {
                Some(pos) if self.sizes[pos] != size => {
                    return Err(InferenceError::InvalidPotential(format!(
                        "domain size mismatch for {:?}: {} vs {}",
                        var, self.sizes[pos], size
                    )));
                }
                Some(_) => {}
                None => {
                    scope.push(var);
                    sizes.push(size);
                }
            }
        }

        let self_strides = strides(&self.sizes);
        let other_strides = strides(&other.sizes);
        let stride_a: Vec<usize> = (0..scope.len())
            .map(|d| self_strides.get(d).copied().unwrap_or(0))
            .collect();
        let stride_b: Vec<usize> = scope
            .iter()
            .map(|&var| other.position(var).map_or(0, |pos| other_strides[pos]))
            .collect();

        let total: usize = sizes.iter().product();
        let mut values = Vec::with_capacity(total);
        let mut counter = vec![0_usize; scope.len()];
        let (mut ia, mut ib) = (0_usize, 0_usize);
        for _ in 0..total {
            values.push(self.values[ia] * other.values[ib]);
            for d in (0..scope.len()).rev() {
                counter[d] += 1;
                ia += stride_a[d];
                ib += stride_b[d];
                if counter[d] < sizes[d] {
                    break;
                }
                ia -= stride_a[d] * sizes[d];
                ib -= stride_b[d] * sizes[d];
                counter[d] = 0;
            }
        }

        Ok(Potential {
            scope,
            sizes,
            values,
        })
    }

    /// Sums out every variable of `out_vars` that belongs to the scope.
    pub fn project(&self, out_vars: &[NodeId]) -> Potential {
        let kept: Vec<usize> = (0..self.scope.len())
            .filter(|&d| !out_vars.contains(&self.scope[d]))
            .collect();
        if kept.len() == self.scope.len() {
            return self.clone();
        }

        let scope: Vec<NodeId> = kept.iter().map(|&d| self.scope[d]).collect();
        let sizes: Vec<usize> = kept.iter().map(|&d| self.sizes[d]).collect();
        let kept_strides = strides(&sizes);
        let mut target_stride = vec![0_usize; self.scope.len()];
        for (k, &d) in kept.iter().enumerate() {
            target_stride[d] = kept_strides[k];
        }

        let mut values = vec![0.0; sizes.iter().product()];
        let mut counter = vec![0_usize; self.scope.len()];
        let mut target = 0_usize;
        for &value in &self.values {
            values[target] += value;
            for d in (0..self.scope.len()).rev() {
                counter[d] += 1;
                target += target_stride[d];
                if counter[d] < self.sizes[d] {
                    break;
                }
                target -= target_stride[d] * self.sizes[d];
                counter[d] = 0;
            }
        }

        Potential {
            scope,
            sizes,
            values,
        }
    }

    /// Sums out every variable not in `keep`.
    pub fn marginalize_onto(&self, keep: &[NodeId]) -> Potential {
        let out: Vec<NodeId> = self
            .scope
            .iter()
            .copied()
            .filter(|var| !keep.contains(var))
            .collect();
        self.project(&out)
    }

    /// Value of a full assignment of the scope (extra variables are ignored).
    pub fn evaluate(&self, assignment: &Assignment) -> Result<f64, InferenceError> {
        let mut offset = 0_usize;
        for ((var, size), stride) in self.variables().zip(strides(&self.sizes)) {
            let value = *assignment.get(&var).ok_or_else(|| {
                InferenceError::InvalidPotential(format!("assignment misses {:?}", var))
            })?;
            if value >= size {
                return Err(InferenceError::InvalidPotential(format!(
                    "value {} out of range for {:?}",
                    value, var
                )));
            }
            offset += value * stride;
        }
        Ok(self.values[offset])
    }

    /// Slices the table on the variables of `partial` that belong to the scope.
    ///
    /// The result is defined over the remaining (unassigned) variables.
    pub fn extract(&self, partial: &Assignment) -> Result<Potential, InferenceError> {
        let source_strides = strides(&self.sizes);
        let mut base = 0_usize;
        let mut free = Vec::new();
        for (d, (var, size)) in self.variables().enumerate() {
            match partial.get(&var) {
                Some(&value) if value >= size => {
                    return Err(InferenceError::InvalidPotential(format!(
                        "value {} out of range for {:?}",
                        value, var
                    )));
                }
                Some(&value) => base += value * source_strides[d],
                None => free.push(d),
            }
        }

        let scope: Vec<NodeId> = free.iter().map(|&d| self.scope[d]).collect();
        let sizes: Vec<usize> = free.iter().map(|&d| self.sizes[d]).collect();
        let free_strides: Vec<usize> = free.iter().map(|&d| source_strides[d]).collect();
        let total: usize = sizes.iter().product();
        let mut values = Vec::with_capacity(total);
        let mut counter = vec![0_usize; free.len()];
        let mut offset = base;
        for _ in 0..total {
            values.push(self.values[offset]);
            for d in (0..free.len()).rev() {
                counter[d] += 1;
                offset += free_strides[d];
                if counter[d] < sizes[d] {
                    break;
                }
                offset -= free_strides[d] * sizes[d];
                counter[d] = 0;
            }
        }

        Ok(Potential {
            scope,
            sizes,
            values,
        })
    }

    /// Rescales the entries to sum to one.
    pub fn normalize(&mut self) -> Result<(), InferenceError> {
        let total = self.sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(InferenceError::Numerical(format!(
                "cannot normalize potential over {:?} with total mass {}",
                self.scope, total
            )));
        }
        for value in &mut self.values {
            *value /= total;
        }
        Ok(())
    }

    /// Normalized copy of this potential.
    pub fn normalized(&self) -> Result<Potential, InferenceError> {
        let mut out = self.clone();
        out.normalize()?;
        Ok(out)
    }

    /// Whether every slice over the last scope variable sums to one.
    pub fn is_conditional_on_last(&self) -> bool {
        let Some(&row) = self.sizes.last() else {
            return (self.values[0] - 1.0).abs() <= NORMALIZATION_TOLERANCE;
        };
        self.values
            .chunks(row)
            .all(|chunk| (chunk.iter().sum::<f64>() - 1.0).abs() <= NORMALIZATION_TOLERANCE)
    }

    /// Largest absolute entry difference, or `None` when the scopes differ.
    pub fn max_abs_diff(&self, other: &Potential) -> Option<f64> {
        if self.scope != other.scope || self.sizes != other.sizes {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}

/// Row-major strides (last dimension fastest).
fn strides(sizes: &[usize]) -> Vec<usize> {
    let mut out = vec![1_usize; sizes.len()];
    for d in (0..sizes.len().saturating_sub(1)).rev() {
        out[d] = out[d + 1] * sizes[d + 1];
    }
    out
}
