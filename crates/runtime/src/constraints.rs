//! Performance constraints.
//!
//! A budget record enforced at every evaluator tick: execution steps,
//! allocated nodes, opcode depth, and entity-creation ceilings. Budgets
//! compose transitively across nested sandboxed calls: a child's budget is
//! the minimum of its request and the caller's remaining headroom, so a
//! sandbox can never outspend its parent.

use crate::entity::EntityId;

/// Composable resource budget. A zero limit means "unconstrained" for the
/// step/alloc/depth/id-length fields; the entity-count fields carry an
/// explicit in-use flag because zero is a meaningful limit there.
#[derive(Debug, Clone, Default)]
pub struct PerformanceConstraints {
    pub max_execution_steps: u64,
    pub cur_execution_step: u64,

    /// Absolute ceiling on the owning pool's used-node count (already
    /// offset by the nodes in use when the constraint was installed).
    pub max_allocated_nodes: usize,

    pub max_opcode_depth: usize,

    pub constrain_contained_entities: bool,
    pub max_contained_entities: usize,

    pub constrain_contained_entity_depth: bool,
    pub max_contained_entity_depth: usize,

    pub max_entity_id_length: usize,

    /// Entity from which entity-creation budgets are measured.
    pub entity_to_constrain_from: Option<EntityId>,
}

/// Raw numeric parameters for [`PerformanceConstraints::from_values`]:
/// steps, allocated nodes, depth, contained entities, entity depth,
/// entity id length — each `None` when absent or non-activating.
pub type ConstraintParams = [Option<f64>; 6];

impl PerformanceConstraints {
    /// Build a constraint record from up to six numeric parameters. Zero
    /// or NaN means "no limit". Values >= 1 activate the step/alloc/depth/
    /// id-length limits; the entity-count limits activate at >= 0.
    /// Returns `None` when nothing was constrained.
    pub fn from_values(params: &ConstraintParams, include_entity: bool) -> Option<Self> {
        let mut constraints = PerformanceConstraints::default();
        let mut any = false;

        if let Some(v) = params[0] {
            if v >= 1.0 {
                constraints.max_execution_steps = v as u64;
                any = true;
            }
        }
        if let Some(v) = params[1] {
            if v >= 1.0 {
                constraints.max_allocated_nodes = v as usize;
                any = true;
            }
        }
        if let Some(v) = params[2] {
            if v >= 1.0 {
                constraints.max_opcode_depth = v as usize;
                any = true;
            }
        }
        if include_entity {
            if let Some(v) = params[3] {
                if v >= 0.0 {
                    constraints.constrain_contained_entities = true;
                    constraints.max_contained_entities = v as usize;
                    any = true;
                }
            }
            if let Some(v) = params[4] {
                if v >= 0.0 {
                    constraints.constrain_contained_entity_depth = true;
                    constraints.max_contained_entity_depth = v as usize;
                    any = true;
                }
            }
            if let Some(v) = params[5] {
                if v >= 1.0 {
                    constraints.max_entity_id_length = v as usize;
                    any = true;
                }
            }
        }

        any.then_some(constraints)
    }

    #[inline]
    pub fn constrained_steps(&self) -> bool {
        self.max_execution_steps != 0
    }

    #[inline]
    pub fn remaining_steps(&self) -> u64 {
        self.max_execution_steps
            .saturating_sub(self.cur_execution_step)
    }

    #[inline]
    pub fn constrained_allocs(&self) -> bool {
        self.max_allocated_nodes != 0
    }

    /// Remaining node headroom given the pool's current used count.
    #[inline]
    pub fn remaining_allocs(&self, used_nodes: usize) -> usize {
        self.max_allocated_nodes.saturating_sub(used_nodes)
    }

    #[inline]
    pub fn constrained_depth(&self) -> bool {
        self.max_opcode_depth != 0
    }

    #[inline]
    pub fn remaining_depth(&self, cur_depth: usize) -> usize {
        self.max_opcode_depth.saturating_sub(cur_depth)
    }

    /// Whether any budget is spent. Fires within one step of exhaustion.
    pub fn exhausted(&self, used_nodes: usize, cur_depth: usize) -> bool {
        if self.constrained_steps() && self.cur_execution_step >= self.max_execution_steps {
            return true;
        }
        if self.constrained_allocs() && used_nodes > self.max_allocated_nodes {
            return true;
        }
        if self.constrained_depth() && cur_depth > self.max_opcode_depth {
            return true;
        }
        false
    }

    /// Compose a child sandbox's requested constraints with the enclosing
    /// ones: every budget becomes the minimum of the caller's remaining
    /// headroom and the child's request. A caller with zero headroom gives
    /// the child a single step already spent, so the child's first check
    /// fires immediately.
    ///
    /// `used_nodes` is the pool's current used count, `cur_depth` the
    /// current opcode depth, and `worker_count` scales the allocation
    /// ceiling when parallel evaluation shares the pool budget.
    pub fn populate_counters(
        &self,
        child: &mut PerformanceConstraints,
        used_nodes: usize,
        cur_depth: usize,
        worker_count: usize,
    ) {
        if self.constrained_steps() {
            let remaining = self.remaining_steps();
            if remaining > 0 {
                child.max_execution_steps = if child.constrained_steps() {
                    child.max_execution_steps.min(remaining)
                } else {
                    remaining
                };
            } else {
                child.max_execution_steps = 1;
                child.cur_execution_step = 1;
            }
        }

        if self.constrained_allocs() {
            let remaining = self.remaining_allocs(used_nodes);
            if remaining > 0 {
                child.max_allocated_nodes = if child.constrained_allocs() {
                    child.max_allocated_nodes.min(remaining)
                } else {
                    remaining
                };
            } else {
                child.max_allocated_nodes = 1;
            }
        }
        if child.constrained_allocs() {
            // other workers may be eating into the same pool
            child.max_allocated_nodes *= worker_count.max(1);
            // turn the relative budget into an absolute ceiling
            child.max_allocated_nodes += used_nodes;
        }

        if self.constrained_depth() {
            let remaining = self.remaining_depth(cur_depth);
            if remaining > 0 {
                child.max_opcode_depth = if child.constrained_depth() {
                    child.max_opcode_depth.min(remaining)
                } else {
                    remaining
                };
            } else {
                child.max_opcode_depth = 1;
            }
        }

        if self.constrain_contained_entities {
            child.constrain_contained_entities = true;
            child.max_contained_entities = if child.max_contained_entities != 0 {
                child.max_contained_entities.min(self.max_contained_entities)
            } else {
                self.max_contained_entities
            };
        }
        if self.constrain_contained_entity_depth {
            child.constrain_contained_entity_depth = true;
            child.max_contained_entity_depth = if child.max_contained_entity_depth != 0 {
                child
                    .max_contained_entity_depth
                    .min(self.max_contained_entity_depth)
            } else {
                self.max_contained_entity_depth
            };
        }
        if self.max_entity_id_length > 0 {
            // the id-length budget stays its own field; it never spills
            // into the allocation budget
            child.max_entity_id_length = if child.max_entity_id_length > 0 {
                child.max_entity_id_length.min(self.max_entity_id_length)
            } else {
                self.max_entity_id_length
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_zero_and_nan_mean_unlimited() {
        let params: ConstraintParams = [Some(0.0), Some(f64::NAN), None, None, None, None];
        assert!(PerformanceConstraints::from_values(&params, true).is_none());

        let params: ConstraintParams = [Some(10.0), None, None, None, None, None];
        let c = PerformanceConstraints::from_values(&params, false).unwrap();
        assert_eq!(c.max_execution_steps, 10);
    }

    #[test]
    fn test_entity_count_activates_at_zero() {
        let params: ConstraintParams = [None, None, None, Some(0.0), None, None];
        let c = PerformanceConstraints::from_values(&params, true).unwrap();
        assert!(c.constrain_contained_entities);
        assert_eq!(c.max_contained_entities, 0);

        // entity params ignored when not included
        assert!(PerformanceConstraints::from_values(&params, false).is_none());
    }

    #[test]
    fn test_child_budget_is_monotonic() {
        let mut parent = PerformanceConstraints {
            max_execution_steps: 100,
            cur_execution_step: 60,
            ..Default::default()
        };
        let mut child = PerformanceConstraints {
            max_execution_steps: 500,
            ..Default::default()
        };
        parent.populate_counters(&mut child, 0, 0, 1);
        assert_eq!(child.max_execution_steps, 40);

        // an exhausted parent leaves the child one already-spent step
        parent.cur_execution_step = 100;
        let mut child = PerformanceConstraints::default();
        parent.populate_counters(&mut child, 0, 0, 1);
        assert_eq!(child.max_execution_steps, 1);
        assert_eq!(child.cur_execution_step, 1);
        assert!(child.exhausted(0, 0));
    }

    #[test]
    fn test_alloc_ceiling_is_absolute() {
        let parent = PerformanceConstraints {
            max_allocated_nodes: 1000,
            ..Default::default()
        };
        let mut child = PerformanceConstraints {
            max_allocated_nodes: 200,
            ..Default::default()
        };
        // 300 nodes already in use, single worker
        parent.populate_counters(&mut child, 300, 0, 1);
        assert_eq!(child.max_allocated_nodes, 200 + 300);
    }

    #[test]
    fn test_id_length_budget_stays_separate() {
        let parent = PerformanceConstraints {
            max_entity_id_length: 32,
            ..Default::default()
        };
        let mut child = PerformanceConstraints::default();
        parent.populate_counters(&mut child, 0, 0, 1);
        assert_eq!(child.max_entity_id_length, 32);
        assert_eq!(child.max_allocated_nodes, 0);
    }

    #[test]
    fn test_exhaustion_checks() {
        let c = PerformanceConstraints {
            max_execution_steps: 5,
            cur_execution_step: 5,
            ..Default::default()
        };
        assert!(c.exhausted(0, 0));

        let c = PerformanceConstraints {
            max_opcode_depth: 3,
            ..Default::default()
        };
        assert!(!c.exhausted(0, 3));
        assert!(c.exhausted(0, 4));
    }
}
