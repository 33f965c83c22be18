//! Opcode kinds.
//!
//! Every node carries one of these tags; the interpreter dispatches on it
//! through a dense table, so the discriminant order here is load-bearing:
//! `Opcode::ALL[op.index()] == op` for every variant.

/// Tagged operator kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    // built-in / system specific
    System,
    GetDefaults,

    // parsing
    Parse,
    Unparse,

    // core control
    If,
    Sequence,
    Parallel,
    Lambda,
    Conclude,
    Return,
    Call,
    CallSandboxed,
    While,

    // definitions
    Let,
    Declare,
    Assign,
    Accum,

    // retrieval
    Retrieve,
    Get,
    Set,
    Replace,

    // stack and node manipulation
    Target,
    CurrentIndex,
    CurrentValue,
    PreviousResult,
    OpcodeStack,
    Stack,
    Args,

    // simulation and operations
    Rand,
    WeightedRand,
    GetRandSeed,
    SetRandSeed,
    SystemTime,

    // base math
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
    GetDigits,
    SetDigits,
    Floor,
    Ceiling,
    Round,

    // extended math
    Exponent,
    Log,
    Sin,
    Asin,
    Cos,
    Acos,
    Tan,
    Atan,
    Sinh,
    Asinh,
    Cosh,
    Acosh,
    Tanh,
    Atanh,
    Erf,
    Tgamma,
    Lgamma,
    Sqrt,
    Pow,
    Abs,
    Max,
    Min,
    DotProduct,
    GeneralizedDistance,
    Entropy,

    // list manipulation
    First,
    Tail,
    Last,
    Trunc,
    Append,
    Size,
    Range,

    // transformation
    Rewrite,
    Map,
    Filter,
    Weave,
    Reduce,
    Apply,
    Reverse,
    Sort,

    // associative list manipulation
    Indices,
    Values,
    ContainsIndex,
    ContainsValue,
    Remove,
    Keep,
    Associate,
    Zip,
    Unzip,

    // logic
    And,
    Or,
    Xor,
    Not,

    // equivalence
    Equal,
    Nequal,
    Less,
    Lequal,
    Greater,
    Gequal,
    TypeEquals,
    TypeNequals,

    // built-in constants and variables
    True,
    False,
    Null,

    // data types
    List,
    Assoc,
    Number,
    Str,
    Symbol,

    // node types
    GetType,
    GetTypeString,
    SetType,
    Format,

    // node metadata: labels, comments, and concurrency
    GetLabels,
    GetAllLabels,
    SetLabels,
    ZipLabels,
    GetComments,
    SetComments,
    GetConcurrency,
    SetConcurrency,
    GetValue,
    SetValue,

    // string
    Explode,
    Split,
    Substr,
    Concat,

    // encryption
    CryptoSign,
    CryptoSignVerify,
    Encrypt,
    Decrypt,

    // I/O
    Print,

    // tree merging
    TotalSize,
    Mutate,
    Commonality,
    EditDistance,
    Intersect,
    Union,
    Difference,
    Mix,
    MixLabels,

    // entity merging
    TotalEntitySize,
    FlattenEntity,
    MutateEntity,
    CommonalityEntities,
    EditDistanceEntities,
    IntersectEntities,
    UnionEntities,
    DifferenceEntities,
    MixEntities,

    // entity details
    GetEntityComments,
    RetrieveEntityRoot,
    AssignEntityRoots,
    AccumEntityRoots,
    GetEntityRandSeed,
    SetEntityRandSeed,
    GetEntityRootPermission,
    SetEntityRootPermission,

    // entity base actions
    CreateEntities,
    CloneEntities,
    MoveEntities,
    DestroyEntities,
    Load,
    LoadEntity,
    LoadPersistentEntity,
    Store,
    StoreEntity,
    ContainsEntity,

    // entity query
    ContainedEntities,
    ComputeOnContainedEntities,
    QuerySelect,
    QuerySample,
    QueryWeightedSample,
    QueryInEntityList,
    QueryNotInEntityList,
    QueryCount,
    QueryExists,
    QueryNotExists,
    QueryEquals,
    QueryNotEquals,
    QueryBetween,
    QueryNotBetween,
    QueryAmong,
    QueryNotAmong,
    QueryMax,
    QueryMin,
    QuerySum,
    QueryMode,
    QueryQuantile,
    QueryGeneralizedMean,
    QueryMinDifference,
    QueryMaxDifference,
    QueryValueMasses,
    QueryGreaterOrEqualTo,
    QueryLessOrEqualTo,
    QueryWithinGeneralizedDistance,
    QueryNearestGeneralizedDistance,

    // aggregate analysis queries
    ComputeEntityConvictions,
    ComputeEntityGroupKlDivergence,
    ComputeEntityDistanceContributions,
    ComputeEntityKlDivergences,

    // entity access
    ContainsLabel,
    AssignToEntities,
    DirectAssignToEntities,
    AccumToEntities,
    RetrieveFromEntity,
    DirectRetrieveFromEntity,
    CallEntity,
    CallEntityGetChanges,
    CallContainer,

    // not in active memory
    Deallocated,
    Uninitialized,

    // sentinel for unknown tokens
    NotABuiltInType,
}

/// What payload shape a kind carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// No payload at all (true/false/null, sentinels).
    Empty,
    /// A single f64.
    Number,
    /// A single interned string.
    Str,
    /// Ordered child list.
    Ordered,
    /// Unordered child map keyed by interned string.
    Mapped,
}

impl Opcode {
    /// Number of kinds, including the sentinel.
    pub const COUNT: usize = Self::ALL.len();

    /// All kinds in discriminant order.
    pub const ALL: [Opcode; 216] = [
        Opcode::System,
        Opcode::GetDefaults,
        Opcode::Parse,
        Opcode::Unparse,
        Opcode::If,
        Opcode::Sequence,
        Opcode::Parallel,
        Opcode::Lambda,
        Opcode::Conclude,
        Opcode::Return,
        Opcode::Call,
        Opcode::CallSandboxed,
        Opcode::While,
        Opcode::Let,
        Opcode::Declare,
        Opcode::Assign,
        Opcode::Accum,
        Opcode::Retrieve,
        Opcode::Get,
        Opcode::Set,
        Opcode::Replace,
        Opcode::Target,
        Opcode::CurrentIndex,
        Opcode::CurrentValue,
        Opcode::PreviousResult,
        Opcode::OpcodeStack,
        Opcode::Stack,
        Opcode::Args,
        Opcode::Rand,
        Opcode::WeightedRand,
        Opcode::GetRandSeed,
        Opcode::SetRandSeed,
        Opcode::SystemTime,
        Opcode::Add,
        Opcode::Subtract,
        Opcode::Multiply,
        Opcode::Divide,
        Opcode::Modulus,
        Opcode::GetDigits,
        Opcode::SetDigits,
        Opcode::Floor,
        Opcode::Ceiling,
        Opcode::Round,
        Opcode::Exponent,
        Opcode::Log,
        Opcode::Sin,
        Opcode::Asin,
        Opcode::Cos,
        Opcode::Acos,
        Opcode::Tan,
        Opcode::Atan,
        Opcode::Sinh,
        Opcode::Asinh,
        Opcode::Cosh,
        Opcode::Acosh,
        Opcode::Tanh,
        Opcode::Atanh,
        Opcode::Erf,
        Opcode::Tgamma,
        Opcode::Lgamma,
        Opcode::Sqrt,
        Opcode::Pow,
        Opcode::Abs,
        Opcode::Max,
        Opcode::Min,
        Opcode::DotProduct,
        Opcode::GeneralizedDistance,
        Opcode::Entropy,
        Opcode::First,
        Opcode::Tail,
        Opcode::Last,
        Opcode::Trunc,
        Opcode::Append,
        Opcode::Size,
        Opcode::Range,
        Opcode::Rewrite,
        Opcode::Map,
        Opcode::Filter,
        Opcode::Weave,
        Opcode::Reduce,
        Opcode::Apply,
        Opcode::Reverse,
        Opcode::Sort,
        Opcode::Indices,
        Opcode::Values,
        Opcode::ContainsIndex,
        Opcode::ContainsValue,
        Opcode::Remove,
        Opcode::Keep,
        Opcode::Associate,
        Opcode::Zip,
        Opcode::Unzip,
        Opcode::And,
        Opcode::Or,
        Opcode::Xor,
        Opcode::Not,
        Opcode::Equal,
        Opcode::Nequal,
        Opcode::Less,
        Opcode::Lequal,
        Opcode::Greater,
        Opcode::Gequal,
        Opcode::TypeEquals,
        Opcode::TypeNequals,
        Opcode::True,
        Opcode::False,
        Opcode::Null,
        Opcode::List,
        Opcode::Assoc,
        Opcode::Number,
        Opcode::Str,
        Opcode::Symbol,
        Opcode::GetType,
        Opcode::GetTypeString,
        Opcode::SetType,
        Opcode::Format,
        Opcode::GetLabels,
        Opcode::GetAllLabels,
        Opcode::SetLabels,
        Opcode::ZipLabels,
        Opcode::GetComments,
        Opcode::SetComments,
        Opcode::GetConcurrency,
        Opcode::SetConcurrency,
        Opcode::GetValue,
        Opcode::SetValue,
        Opcode::Explode,
        Opcode::Split,
        Opcode::Substr,
        Opcode::Concat,
        Opcode::CryptoSign,
        Opcode::CryptoSignVerify,
        Opcode::Encrypt,
        Opcode::Decrypt,
        Opcode::Print,
        Opcode::TotalSize,
        Opcode::Mutate,
        Opcode::Commonality,
        Opcode::EditDistance,
        Opcode::Intersect,
        Opcode::Union,
        Opcode::Difference,
        Opcode::Mix,
        Opcode::MixLabels,
        Opcode::TotalEntitySize,
        Opcode::FlattenEntity,
        Opcode::MutateEntity,
        Opcode::CommonalityEntities,
        Opcode::EditDistanceEntities,
        Opcode::IntersectEntities,
        Opcode::UnionEntities,
        Opcode::DifferenceEntities,
        Opcode::MixEntities,
        Opcode::GetEntityComments,
        Opcode::RetrieveEntityRoot,
        Opcode::AssignEntityRoots,
        Opcode::AccumEntityRoots,
        Opcode::GetEntityRandSeed,
        Opcode::SetEntityRandSeed,
        Opcode::GetEntityRootPermission,
        Opcode::SetEntityRootPermission,
        Opcode::CreateEntities,
        Opcode::CloneEntities,
        Opcode::MoveEntities,
        Opcode::DestroyEntities,
        Opcode::Load,
        Opcode::LoadEntity,
        Opcode::LoadPersistentEntity,
        Opcode::Store,
        Opcode::StoreEntity,
        Opcode::ContainsEntity,
        Opcode::ContainedEntities,
        Opcode::ComputeOnContainedEntities,
        Opcode::QuerySelect,
        Opcode::QuerySample,
        Opcode::QueryWeightedSample,
        Opcode::QueryInEntityList,
        Opcode::QueryNotInEntityList,
        Opcode::QueryCount,
        Opcode::QueryExists,
        Opcode::QueryNotExists,
        Opcode::QueryEquals,
        Opcode::QueryNotEquals,
        Opcode::QueryBetween,
        Opcode::QueryNotBetween,
        Opcode::QueryAmong,
        Opcode::QueryNotAmong,
        Opcode::QueryMax,
        Opcode::QueryMin,
        Opcode::QuerySum,
        Opcode::QueryMode,
        Opcode::QueryQuantile,
        Opcode::QueryGeneralizedMean,
        Opcode::QueryMinDifference,
        Opcode::QueryMaxDifference,
        Opcode::QueryValueMasses,
        Opcode::QueryGreaterOrEqualTo,
        Opcode::QueryLessOrEqualTo,
        Opcode::QueryWithinGeneralizedDistance,
        Opcode::QueryNearestGeneralizedDistance,
        Opcode::ComputeEntityConvictions,
        Opcode::ComputeEntityGroupKlDivergence,
        Opcode::ComputeEntityDistanceContributions,
        Opcode::ComputeEntityKlDivergences,
        Opcode::ContainsLabel,
        Opcode::AssignToEntities,
        Opcode::DirectAssignToEntities,
        Opcode::AccumToEntities,
        Opcode::RetrieveFromEntity,
        Opcode::DirectRetrieveFromEntity,
        Opcode::CallEntity,
        Opcode::CallEntityGetChanges,
        Opcode::CallContainer,
        Opcode::Deallocated,
        Opcode::Uninitialized,
        Opcode::NotABuiltInType,
    ];

    /// Dense table index.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`Opcode::index`]; out-of-range maps to the sentinel.
    #[inline]
    pub fn from_index(index: usize) -> Opcode {
        Self::ALL.get(index).copied().unwrap_or(Opcode::NotABuiltInType)
    }

    /// Textual form used by the parser and unparser.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::System => "system",
            Opcode::GetDefaults => "get_defaults",
            Opcode::Parse => "parse",
            Opcode::Unparse => "unparse",
            Opcode::If => "if",
            Opcode::Sequence => "seq",
            Opcode::Parallel => "parallel",
            Opcode::Lambda => "lambda",
            Opcode::Conclude => "conclude",
            Opcode::Return => "return",
            Opcode::Call => "call",
            Opcode::CallSandboxed => "call_sandboxed",
            Opcode::While => "while",
            Opcode::Let => "let",
            Opcode::Declare => "declare",
            Opcode::Assign => "assign",
            Opcode::Accum => "accum",
            Opcode::Retrieve => "retrieve",
            Opcode::Get => "get",
            Opcode::Set => "set",
            Opcode::Replace => "replace",
            Opcode::Target => "target",
            Opcode::CurrentIndex => "current_index",
            Opcode::CurrentValue => "current_value",
            Opcode::PreviousResult => "previous_result",
            Opcode::OpcodeStack => "opcode_stack",
            Opcode::Stack => "stack",
            Opcode::Args => "args",
            Opcode::Rand => "rand",
            Opcode::WeightedRand => "weighted_rand",
            Opcode::GetRandSeed => "get_rand_seed",
            Opcode::SetRandSeed => "set_rand_seed",
            Opcode::SystemTime => "system_time",
            Opcode::Add => "+",
            Opcode::Subtract => "-",
            Opcode::Multiply => "*",
            Opcode::Divide => "/",
            Opcode::Modulus => "mod",
            Opcode::GetDigits => "get_digits",
            Opcode::SetDigits => "set_digits",
            Opcode::Floor => "floor",
            Opcode::Ceiling => "ceil",
            Opcode::Round => "round",
            Opcode::Exponent => "exp",
            Opcode::Log => "log",
            Opcode::Sin => "sin",
            Opcode::Asin => "asin",
            Opcode::Cos => "cos",
            Opcode::Acos => "acos",
            Opcode::Tan => "tan",
            Opcode::Atan => "atan",
            Opcode::Sinh => "sinh",
            Opcode::Asinh => "asinh",
            Opcode::Cosh => "cosh",
            Opcode::Acosh => "acosh",
            Opcode::Tanh => "tanh",
            Opcode::Atanh => "atanh",
            Opcode::Erf => "erf",
            Opcode::Tgamma => "tgamma",
            Opcode::Lgamma => "lgamma",
            Opcode::Sqrt => "sqrt",
            Opcode::Pow => "pow",
            Opcode::Abs => "abs",
            Opcode::Max => "max",
            Opcode::Min => "min",
            Opcode::DotProduct => "dot_product",
            Opcode::GeneralizedDistance => "generalized_distance",
            Opcode::Entropy => "entropy",
            Opcode::First => "first",
            Opcode::Tail => "tail",
            Opcode::Last => "last",
            Opcode::Trunc => "trunc",
            Opcode::Append => "append",
            Opcode::Size => "size",
            Opcode::Range => "range",
            Opcode::Rewrite => "rewrite",
            Opcode::Map => "map",
            Opcode::Filter => "filter",
            Opcode::Weave => "weave",
            Opcode::Reduce => "reduce",
            Opcode::Apply => "apply",
            Opcode::Reverse => "reverse",
            Opcode::Sort => "sort",
            Opcode::Indices => "indices",
            Opcode::Values => "values",
            Opcode::ContainsIndex => "contains_index",
            Opcode::ContainsValue => "contains_value",
            Opcode::Remove => "remove",
            Opcode::Keep => "keep",
            Opcode::Associate => "associate",
            Opcode::Zip => "zip",
            Opcode::Unzip => "unzip",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Not => "not",
            Opcode::Equal => "=",
            Opcode::Nequal => "!=",
            Opcode::Less => "<",
            Opcode::Lequal => "<=",
            Opcode::Greater => ">",
            Opcode::Gequal => ">=",
            Opcode::TypeEquals => "~",
            Opcode::TypeNequals => "!~",
            Opcode::True => "true",
            Opcode::False => "false",
            Opcode::Null => "null",
            Opcode::List => "list",
            Opcode::Assoc => "assoc",
            Opcode::Number => "number",
            Opcode::Str => "string",
            Opcode::Symbol => "symbol",
            Opcode::GetType => "get_type",
            Opcode::GetTypeString => "get_type_string",
            Opcode::SetType => "set_type",
            Opcode::Format => "format",
            Opcode::GetLabels => "get_labels",
            Opcode::GetAllLabels => "get_all_labels",
            Opcode::SetLabels => "set_labels",
            Opcode::ZipLabels => "zip_labels",
            Opcode::GetComments => "get_comments",
            Opcode::SetComments => "set_comments",
            Opcode::GetConcurrency => "get_concurrency",
            Opcode::SetConcurrency => "set_concurrency",
            Opcode::GetValue => "get_value",
            Opcode::SetValue => "set_value",
            Opcode::Explode => "explode",
            Opcode::Split => "split",
            Opcode::Substr => "substr",
            Opcode::Concat => "concat",
            Opcode::CryptoSign => "crypto_sign",
            Opcode::CryptoSignVerify => "crypto_sign_verify",
            Opcode::Encrypt => "encrypt",
            Opcode::Decrypt => "decrypt",
            Opcode::Print => "print",
            Opcode::TotalSize => "total_size",
            Opcode::Mutate => "mutate",
            Opcode::Commonality => "commonality",
            Opcode::EditDistance => "edit_distance",
            Opcode::Intersect => "intersect",
            Opcode::Union => "union",
            Opcode::Difference => "difference",
            Opcode::Mix => "mix",
            Opcode::MixLabels => "mix_labels",
            Opcode::TotalEntitySize => "total_entity_size",
            Opcode::FlattenEntity => "flatten_entity",
            Opcode::MutateEntity => "mutate_entity",
            Opcode::CommonalityEntities => "commonality_entities",
            Opcode::EditDistanceEntities => "edit_distance_entities",
            Opcode::IntersectEntities => "intersect_entities",
            Opcode::UnionEntities => "union_entities",
            Opcode::DifferenceEntities => "difference_entities",
            Opcode::MixEntities => "mix_entities",
            Opcode::GetEntityComments => "get_entity_comments",
            Opcode::RetrieveEntityRoot => "retrieve_entity_root",
            Opcode::AssignEntityRoots => "assign_entity_roots",
            Opcode::AccumEntityRoots => "accum_entity_roots",
            Opcode::GetEntityRandSeed => "get_entity_rand_seed",
            Opcode::SetEntityRandSeed => "set_entity_rand_seed",
            Opcode::GetEntityRootPermission => "get_entity_root_permission",
            Opcode::SetEntityRootPermission => "set_entity_root_permission",
            Opcode::CreateEntities => "create_entities",
            Opcode::CloneEntities => "clone_entities",
            Opcode::MoveEntities => "move_entities",
            Opcode::DestroyEntities => "destroy_entities",
            Opcode::Load => "load",
            Opcode::LoadEntity => "load_entity",
            Opcode::LoadPersistentEntity => "load_persistent_entity",
            Opcode::Store => "store",
            Opcode::StoreEntity => "store_entity",
            Opcode::ContainsEntity => "contains_entity",
            Opcode::ContainedEntities => "contained_entities",
            Opcode::ComputeOnContainedEntities => "compute_on_contained_entities",
            Opcode::QuerySelect => "query_select",
            Opcode::QuerySample => "query_sample",
            Opcode::QueryWeightedSample => "query_weighted_sample",
            Opcode::QueryInEntityList => "query_in_entity_list",
            Opcode::QueryNotInEntityList => "query_not_in_entity_list",
            Opcode::QueryCount => "query_count",
            Opcode::QueryExists => "query_exists",
            Opcode::QueryNotExists => "query_not_exists",
            Opcode::QueryEquals => "query_equals",
            Opcode::QueryNotEquals => "query_not_equals",
            Opcode::QueryBetween => "query_between",
            Opcode::QueryNotBetween => "query_not_between",
            Opcode::QueryAmong => "query_among",
            Opcode::QueryNotAmong => "query_not_among",
            Opcode::QueryMax => "query_max",
            Opcode::QueryMin => "query_min",
            Opcode::QuerySum => "query_sum",
            Opcode::QueryMode => "query_mode",
            Opcode::QueryQuantile => "query_quantile",
            Opcode::QueryGeneralizedMean => "query_generalized_mean",
            Opcode::QueryMinDifference => "query_min_difference",
            Opcode::QueryMaxDifference => "query_max_difference",
            Opcode::QueryValueMasses => "query_value_masses",
            Opcode::QueryGreaterOrEqualTo => "query_greater_or_equal_to",
            Opcode::QueryLessOrEqualTo => "query_less_or_equal_to",
            Opcode::QueryWithinGeneralizedDistance => "query_within_generalized_distance",
            Opcode::QueryNearestGeneralizedDistance => "query_nearest_generalized_distance",
            Opcode::ComputeEntityConvictions => "compute_entity_convictions",
            Opcode::ComputeEntityGroupKlDivergence => "compute_entity_group_kl_divergence",
            Opcode::ComputeEntityDistanceContributions => "compute_entity_distance_contributions",
            Opcode::ComputeEntityKlDivergences => "compute_entity_kl_divergences",
            Opcode::ContainsLabel => "contains_label",
            Opcode::AssignToEntities => "assign_to_entities",
            Opcode::DirectAssignToEntities => "direct_assign_to_entities",
            Opcode::AccumToEntities => "accum_to_entities",
            Opcode::RetrieveFromEntity => "retrieve_from_entity",
            Opcode::DirectRetrieveFromEntity => "direct_retrieve_from_entity",
            Opcode::CallEntity => "call_entity",
            Opcode::CallEntityGetChanges => "call_entity_get_changes",
            Opcode::CallContainer => "call_container",
            Opcode::Deallocated => "deallocated",
            Opcode::Uninitialized => "uninitialized",
            Opcode::NotABuiltInType => "not_a_built_in_type",
        }
    }

    /// Look up a kind by its textual form.
    pub fn from_name(name: &str) -> Option<Opcode> {
        use std::collections::HashMap;
        use std::sync::OnceLock;

        static BY_NAME: OnceLock<HashMap<&'static str, Opcode>> = OnceLock::new();
        let table = BY_NAME.get_or_init(|| {
            Opcode::ALL
                .iter()
                .map(|&op| (op.name(), op))
                .collect::<HashMap<_, _>>()
        });
        table.get(name).copied()
    }

    /// Payload shape dictated by the kind.
    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Opcode::Number => PayloadKind::Number,
            Opcode::Str | Opcode::Symbol => PayloadKind::Str,
            Opcode::True
            | Opcode::False
            | Opcode::Null
            | Opcode::Deallocated
            | Opcode::Uninitialized
            | Opcode::NotABuiltInType => PayloadKind::Empty,
            Opcode::Assoc => PayloadKind::Mapped,
            _ => PayloadKind::Ordered,
        }
    }

    /// Immediate kinds carry no children.
    #[inline]
    pub fn is_immediate(self) -> bool {
        matches!(
            self.payload_kind(),
            PayloadKind::Empty | PayloadKind::Number | PayloadKind::Str
        )
    }

    /// Pure data-construction kinds: a node of this kind is idempotent when
    /// all of its children are and it carries no labels.
    #[inline]
    pub fn is_data_kind(self) -> bool {
        matches!(
            self,
            Opcode::List
                | Opcode::Assoc
                | Opcode::Number
                | Opcode::Str
                | Opcode::True
                | Opcode::False
                | Opcode::Null
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_table_matches_discriminants() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.index(), i, "discriminant order broken at {op:?}");
            assert_eq!(Opcode::from_index(i), *op);
        }
    }

    #[test]
    fn test_names_round_trip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_name(op.name()), Some(op), "name clash for {op:?}");
        }
    }

    #[test]
    fn test_payload_kinds() {
        assert_eq!(Opcode::Assoc.payload_kind(), PayloadKind::Mapped);
        assert_eq!(Opcode::Number.payload_kind(), PayloadKind::Number);
        assert_eq!(Opcode::Symbol.payload_kind(), PayloadKind::Str);
        assert_eq!(Opcode::Add.payload_kind(), PayloadKind::Ordered);
        assert!(Opcode::Null.is_immediate());
        assert!(!Opcode::List.is_immediate());
    }
}
