//! Dense opcode dispatch table.
//!
//! One entry per [`Opcode`] in discriminant order; `DISPATCH[op.index()]`
//! is the handler. Entries must track `Opcode::ALL` exactly — the test at
//! the bottom spot-checks the alignment.

use sylva_tree::{NodeId, Opcode};

use crate::interpreter::Interpreter;
use crate::opcodes::{
    assoc_ops, control, data, entity_ops, list_ops, logic, math, sim, stack_ops, stubs,
};
use crate::value::Eval;

/// Uniform handler signature.
pub type OpcodeFn = for<'a, 'b> fn(&'a mut Interpreter<'b>, NodeId, bool) -> Eval;

pub static DISPATCH: [OpcodeFn; Opcode::COUNT] = [
    // built-in / system specific
    control::op_system,
    control::op_get_defaults,
    // parsing
    control::op_parse,
    control::op_unparse,
    // core control
    control::op_if,
    control::op_sequence,
    control::op_parallel,
    control::op_lambda,
    control::op_conclude_and_return, // conclude
    control::op_conclude_and_return, // return
    control::op_call,
    control::op_call_sandboxed,
    control::op_while,
    // definitions
    control::op_let,
    control::op_declare,
    control::op_assign_and_accum, // assign
    control::op_assign_and_accum, // accum
    // retrieval
    control::op_retrieve,
    control::op_get,
    control::op_set_and_replace, // set
    control::op_set_and_replace, // replace
    // stack and node manipulation
    stack_ops::op_target,
    stack_ops::op_current_index,
    stack_ops::op_current_value,
    stack_ops::op_previous_result,
    stack_ops::op_opcode_stack,
    stack_ops::op_stack,
    stack_ops::op_args,
    // simulation and operations
    sim::op_rand,
    sim::op_weighted_rand,
    sim::op_get_rand_seed,
    sim::op_set_rand_seed,
    sim::op_system_time,
    // base math
    math::op_add,
    math::op_subtract,
    math::op_multiply,
    math::op_divide,
    math::op_modulus,
    math::op_get_digits,
    math::op_set_digits,
    math::op_floor,
    math::op_ceiling,
    math::op_round,
    // extended math
    math::op_exponent,
    math::op_log,
    math::op_sin,
    math::op_asin,
    math::op_cos,
    math::op_acos,
    math::op_tan,
    math::op_atan,
    math::op_sinh,
    math::op_asinh,
    math::op_cosh,
    math::op_acosh,
    math::op_tanh,
    math::op_atanh,
    math::op_erf,
    math::op_tgamma,
    math::op_lgamma,
    math::op_sqrt,
    math::op_pow,
    math::op_abs,
    math::op_max,
    math::op_min,
    math::op_dot_product,
    stubs::op_unsupported, // generalized_distance
    stubs::op_unsupported, // entropy
    // list manipulation
    list_ops::op_first,
    list_ops::op_tail,
    list_ops::op_last,
    list_ops::op_trunc,
    list_ops::op_append,
    list_ops::op_size,
    list_ops::op_range,
    // transformation
    list_ops::op_rewrite,
    list_ops::op_map,
    list_ops::op_filter,
    list_ops::op_weave,
    list_ops::op_reduce,
    list_ops::op_apply,
    list_ops::op_reverse,
    list_ops::op_sort,
    // associative list manipulation
    assoc_ops::op_indices,
    assoc_ops::op_values,
    assoc_ops::op_contains_index,
    assoc_ops::op_contains_value,
    assoc_ops::op_remove,
    assoc_ops::op_keep,
    assoc_ops::op_associate,
    assoc_ops::op_zip,
    assoc_ops::op_unzip,
    // logic
    logic::op_and,
    logic::op_or,
    logic::op_xor,
    logic::op_not,
    // equivalence
    logic::op_equal,
    logic::op_nequal,
    logic::op_less,
    logic::op_lequal,
    logic::op_greater,
    logic::op_gequal,
    logic::op_type_equals,
    logic::op_type_nequals,
    // built-in constants and variables
    data::op_true,
    data::op_false,
    data::op_null,
    // data types
    data::op_list,
    data::op_assoc,
    data::op_number,
    data::op_string,
    data::op_symbol,
    // node types
    data::op_get_type,
    data::op_get_type_string,
    data::op_set_type,
    data::op_format,
    // node metadata
    data::op_get_labels,
    data::op_get_all_labels,
    data::op_set_labels,
    data::op_zip_labels,
    data::op_get_comments,
    data::op_set_comments,
    data::op_get_concurrency,
    data::op_set_concurrency,
    data::op_get_value,
    data::op_set_value,
    // string
    data::op_explode,
    data::op_split,
    data::op_substr,
    data::op_concat,
    // encryption
    stubs::op_unsupported, // crypto_sign
    stubs::op_unsupported, // crypto_sign_verify
    stubs::op_unsupported, // encrypt
    stubs::op_unsupported, // decrypt
    // I/O
    data::op_print,
    // tree merging
    data::op_total_size,
    stubs::op_unsupported, // mutate
    stubs::op_unsupported, // commonality
    stubs::op_unsupported, // edit_distance
    stubs::op_unsupported, // intersect
    stubs::op_unsupported, // union
    stubs::op_unsupported, // difference
    stubs::op_unsupported, // mix
    stubs::op_unsupported, // mix_labels
    // entity merging
    entity_ops::op_total_entity_size,
    stubs::op_unsupported, // flatten_entity
    stubs::op_unsupported, // mutate_entity
    stubs::op_unsupported, // commonality_entities
    stubs::op_unsupported, // edit_distance_entities
    stubs::op_unsupported, // intersect_entities
    stubs::op_unsupported, // union_entities
    stubs::op_unsupported, // difference_entities
    stubs::op_unsupported, // mix_entities
    // entity details
    entity_ops::op_get_entity_comments,
    entity_ops::op_retrieve_entity_root,
    entity_ops::op_assign_entity_roots, // assign_entity_roots
    entity_ops::op_assign_entity_roots, // accum_entity_roots
    entity_ops::op_get_entity_rand_seed,
    entity_ops::op_set_entity_rand_seed,
    entity_ops::op_get_entity_root_permission,
    entity_ops::op_set_entity_root_permission,
    // entity base actions
    entity_ops::op_create_entities,
    entity_ops::op_clone_entities,
    entity_ops::op_move_entities,
    entity_ops::op_destroy_entities,
    entity_ops::op_load,
    entity_ops::op_load_entity, // load_entity
    entity_ops::op_load_entity, // load_persistent_entity
    entity_ops::op_store,
    entity_ops::op_store_entity,
    entity_ops::op_contains_entity,
    // entity query
    entity_ops::op_contained_entities,
    stubs::op_unsupported, // compute_on_contained_entities
    stubs::op_unsupported, // query_select
    stubs::op_unsupported, // query_sample
    stubs::op_unsupported, // query_weighted_sample
    stubs::op_unsupported, // query_in_entity_list
    stubs::op_unsupported, // query_not_in_entity_list
    stubs::op_unsupported, // query_count
    stubs::op_unsupported, // query_exists
    stubs::op_unsupported, // query_not_exists
    stubs::op_unsupported, // query_equals
    stubs::op_unsupported, // query_not_equals
    stubs::op_unsupported, // query_between
    stubs::op_unsupported, // query_not_between
    stubs::op_unsupported, // query_among
    stubs::op_unsupported, // query_not_among
    stubs::op_unsupported, // query_max
    stubs::op_unsupported, // query_min
    stubs::op_unsupported, // query_sum
    stubs::op_unsupported, // query_mode
    stubs::op_unsupported, // query_quantile
    stubs::op_unsupported, // query_generalized_mean
    stubs::op_unsupported, // query_min_difference
    stubs::op_unsupported, // query_max_difference
    stubs::op_unsupported, // query_value_masses
    stubs::op_unsupported, // query_greater_or_equal_to
    stubs::op_unsupported, // query_less_or_equal_to
    stubs::op_unsupported, // query_within_generalized_distance
    stubs::op_unsupported, // query_nearest_generalized_distance
    // aggregate analysis queries
    stubs::op_unsupported, // compute_entity_convictions
    stubs::op_unsupported, // compute_entity_group_kl_divergence
    stubs::op_unsupported, // compute_entity_distance_contributions
    stubs::op_unsupported, // compute_entity_kl_divergences
    // entity access
    entity_ops::op_contains_label,
    entity_ops::op_assign_to_entities, // assign_to_entities
    entity_ops::op_assign_to_entities, // direct_assign_to_entities
    entity_ops::op_assign_to_entities, // accum_to_entities
    entity_ops::op_retrieve_from_entity, // retrieve_from_entity
    entity_ops::op_retrieve_from_entity, // direct_retrieve_from_entity
    entity_ops::op_call_entity, // call_entity
    entity_ops::op_call_entity, // call_entity_get_changes
    entity_ops::op_call_container,
    // not in active memory
    stubs::op_deallocated, // deallocated
    stubs::op_deallocated, // uninitialized
    // sentinel
    stubs::op_unsupported,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_dense() {
        assert_eq!(DISPATCH.len(), Opcode::COUNT);
    }

    #[test]
    fn test_spot_check_alignment() {
        assert_eq!(
            DISPATCH[Opcode::Add.index()] as usize,
            math::op_add as OpcodeFn as usize
        );
        assert_eq!(
            DISPATCH[Opcode::Sort.index()] as usize,
            list_ops::op_sort as OpcodeFn as usize
        );
        assert_eq!(
            DISPATCH[Opcode::Symbol.index()] as usize,
            data::op_symbol as OpcodeFn as usize
        );
        assert_eq!(
            DISPATCH[Opcode::CallContainer.index()] as usize,
            entity_ops::op_call_container as OpcodeFn as usize
        );
        assert_eq!(
            DISPATCH[Opcode::NotABuiltInType.index()] as usize,
            stubs::op_unsupported as OpcodeFn as usize
        );
    }
}
