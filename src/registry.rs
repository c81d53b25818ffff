use crate::constraints::ConstraintDeclaration;
use crate::dtype::DType;
use std::collections::BTreeMap;
use std::sync::LazyLock;

const UNARY_FLOAT: &[DType] = &[DType::F32, DType::F16, DType::BF16];
const UNARY_FLOAT_F8: &[DType] = &[DType::F32, DType::F16, DType::BF16, DType::F8];
const ABS: &[DType] = &[DType::F32, DType::F16, DType::BF16, DType::I8, DType::I32];
const ARITHMETIC: &[DType] = &[
    DType::F32,
    DType::F16,
    DType::BF16,
    DType::F8,
    DType::I8,
    DType::I32,
    DType::I64,
    DType::BOOL,
];
const POW: &[DType] = &[DType::F32, DType::F16, DType::BF16, DType::I8, DType::I32, DType::I64];
const DATA_MOVEMENT: &[DType] = &[
    DType::F32,
    DType::F16,
    DType::BF16,
    DType::F8,
    DType::I8,
    DType::I32,
    DType::I64,
    DType::BOOL,
];
const REDUCTION: &[DType] = &[DType::F32, DType::F16, DType::BF16, DType::I32, DType::I64];
const CONVOLUTION: &[DType] = &[DType::F32, DType::F16, DType::BF16];
const MATMUL: &[DType] = &[DType::F32, DType::F16, DType::BF16, DType::I32];

#[derive(Debug, Clone)]
pub struct OpDefinition {
    pub name: &'static str,
    pub constraints: ConstraintDeclaration,
}

/// Read-only table from public operation name to its definition.
#[derive(Debug)]
pub struct OpRegistry {
    ops: BTreeMap<&'static str, OpDefinition>,
}

impl OpRegistry {
    fn build() -> Self {
        let mut ops = BTreeMap::new();
        let mut register = |name: &'static str, constraints: ConstraintDeclaration| {
            ops.insert(name, OpDefinition { name, constraints });
        };

        let unary = |allowed: &[DType]| {
            ConstraintDeclaration::new()
                .type_var("T1", allowed)
                .param("input", "T1")
                .returns("T1")
        };
        for name in ["exp", "tanh", "log", "sin", "cos"] {
            register(name, unary(UNARY_FLOAT));
        }
        for name in ["rsqrt", "sqrt"] {
            register(name, unary(UNARY_FLOAT_F8));
        }
        register("abs", unary(ABS));

        let binary = |allowed: &[DType]| {
            ConstraintDeclaration::new()
                .type_var("T1", allowed)
                .param("lhs", "T1")
                .param("rhs", "T1")
                .returns("T1")
        };
        for name in ["add", "sub", "mul", "div", "maximum", "minimum"] {
            register(name, binary(ARITHMETIC));
        }
        register("pow", binary(POW));
        register("matmul", binary(MATMUL));

        register(
            "constant",
            ConstraintDeclaration::new()
                .type_var("T1", &DType::ALL)
                .param("data", "T1")
                .returns("T1"),
        );
        register(
            "cast",
            ConstraintDeclaration::new()
                .type_var("T1", &DType::ALL)
                .type_var("T2", &DType::ALL)
                .param("input", "T1")
                .param("dtype", "T2")
                .returns("T2"),
        );
        for name in ["squeeze", "unsqueeze", "reshape", "permute"] {
            register(name, unary(DATA_MOVEMENT));
        }
        for name in ["sum", "max", "min", "prod", "mean"] {
            register(name, unary(REDUCTION));
        }
        register(
            "convolution",
            ConstraintDeclaration::new()
                .type_var("T1", CONVOLUTION)
                .param("input", "T1")
                .param("weight", "T1")
                .param("bias", "T1")
                .returns("T1"),
        );

        Self { ops }
    }

    pub fn get(&self, name: &str) -> Option<&OpDefinition> {
        self.ops.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ops.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpDefinition> {
        self.ops.values()
    }
}

pub static REGISTRY: LazyLock<OpRegistry> = LazyLock::new(OpRegistry::build);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_declaration_is_well_formed() {
        for def in REGISTRY.iter() {
            def.constraints
                .validate()
                .unwrap_or_else(|e| panic!("{}: {e}", def.name));
            assert!(def.constraints.return_var().is_some(), "{}", def.name);
        }
    }

    #[test]
    fn test_lookup() {
        assert!(REGISTRY.get("squeeze").is_some());
        assert!(REGISTRY.get("softmax").is_none());
        assert_eq!(REGISTRY.names().count(), 28);
    }
}
