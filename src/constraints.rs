use crate::dtype::DType;

fn format_dtypes(dtypes: &[DType]) -> String {
    let names = dtypes.iter().map(|d| d.to_string()).collect::<Vec<_>>();
    format!("[{}]", names.join(", "))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintError {
    #[error(
        "Unsupported data type for parameter '{param}': {dtype}. Type variable {type_var} may only be one of {}",
        format_dtypes(.allowed)
    )]
    DtypeNotAllowed {
        param: String,
        type_var: String,
        dtype: DType,
        allowed: Vec<DType>,
    },
    #[error(
        "Mismatched data types for parameter '{param}': expected {expected} (bound by an earlier argument) but got {got}"
    )]
    DtypeMismatch {
        expected: DType,
        got: DType,
        param: String,
    },
    #[error("Type variable '{0}' is referenced but never declared")]
    UndeclaredTypeVariable(String),
    #[error("Parameter '{0}' has no declared dtype constraint")]
    UnknownParameter(String),
}

/// Dtype constraints of one public operation.
///
/// Type variables name a set of allowed dtypes; parameters and the return value are
/// bound to type variables. Parameters are checked in the order they were declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintDeclaration {
    type_vars: Vec<(String, Vec<DType>)>,
    params: Vec<(String, String)>,
    return_var: Option<String>,
}

impl ConstraintDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_var(mut self, name: &str, allowed: &[DType]) -> Self {
        self.type_vars.push((name.to_string(), allowed.to_vec()));
        self
    }

    pub fn param(mut self, name: &str, type_var: &str) -> Self {
        self.params.push((name.to_string(), type_var.to_string()));
        self
    }

    pub fn returns(mut self, type_var: &str) -> Self {
        self.return_var = Some(type_var.to_string());
        self
    }

    pub fn allowed(&self, type_var: &str) -> Option<&[DType]> {
        self.type_vars
            .iter()
            .find(|(name, _)| name == type_var)
            .map(|(_, allowed)| allowed.as_slice())
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    pub fn return_var(&self) -> Option<&str> {
        self.return_var.as_deref()
    }

    /// Every type variable a parameter or the return value refers to must be declared.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        let referenced = self
            .params
            .iter()
            .map(|(_, v)| v)
            .chain(self.return_var.iter());
        for var in referenced {
            if self.allowed(var).is_none() {
                return Err(ConstraintError::UndeclaredTypeVariable(var.clone()));
            }
        }
        Ok(())
    }

    pub fn check(&self, arguments: &[BoundArgument]) -> Result<ResolvedConstraints, ConstraintError> {
        check(self, arguments)
    }
}

/// The dtype an argument carries at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundArgument {
    pub name: String,
    pub dtype: DType,
}

impl BoundArgument {
    pub fn new(name: &str, dtype: DType) -> Self {
        Self {
            name: name.to_string(),
            dtype,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConstraints {
    bindings: Vec<(String, DType)>,
    return_dtype: Option<DType>,
}

impl ResolvedConstraints {
    pub fn binding(&self, type_var: &str) -> Option<DType> {
        self.bindings
            .iter()
            .find(|(name, _)| name == type_var)
            .map(|(_, dtype)| *dtype)
    }

    /// Output dtype implied by the constraints, if the return type variable was bound.
    pub fn return_dtype(&self) -> Option<DType> {
        self.return_dtype
    }
}

/// Validates argument dtypes against a declaration, unifying shared type variables.
///
/// Parameters that were not supplied (optional inputs) are skipped. The first
/// violation in declaration order is reported.
pub fn check(
    declaration: &ConstraintDeclaration,
    arguments: &[BoundArgument],
) -> Result<ResolvedConstraints, ConstraintError> {
    if let Some(unknown) = arguments
        .iter()
        .find(|arg| !declaration.params.iter().any(|(p, _)| *p == arg.name))
    {
        return Err(ConstraintError::UnknownParameter(unknown.name.clone()));
    }

    let mut resolved = ResolvedConstraints::default();
    for (param, type_var) in &declaration.params {
        let Some(argument) = arguments.iter().find(|arg| arg.name == *param) else {
            continue;
        };
        match resolved.binding(type_var) {
            Some(expected) => {
                if expected != argument.dtype {
                    return Err(ConstraintError::DtypeMismatch {
                        expected,
                        got: argument.dtype,
                        param: param.clone(),
                    });
                }
            }
            None => {
                let allowed = declaration
                    .allowed(type_var)
                    .ok_or_else(|| ConstraintError::UndeclaredTypeVariable(type_var.clone()))?;
                if !allowed.contains(&argument.dtype) {
                    return Err(ConstraintError::DtypeNotAllowed {
                        param: param.clone(),
                        type_var: type_var.clone(),
                        dtype: argument.dtype,
                        allowed: allowed.to_vec(),
                    });
                }
                resolved.bindings.push((type_var.clone(), argument.dtype));
            }
        }
    }

    if let Some(return_var) = &declaration.return_var {
        resolved.return_dtype = resolved.binding(return_var);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_decl() -> ConstraintDeclaration {
        ConstraintDeclaration::new()
            .type_var("T1", &[DType::F32, DType::F16])
            .param("lhs", "T1")
            .param("rhs", "T1")
            .returns("T1")
    }

    #[test]
    fn test_shared_variable_binds_once() {
        let resolved = check(
            &binary_decl(),
            &[
                BoundArgument::new("lhs", DType::F16),
                BoundArgument::new("rhs", DType::F16),
            ],
        )
        .unwrap();
        assert_eq!(resolved.return_dtype(), Some(DType::F16));
    }

    #[test]
    fn test_first_violation_in_declaration_order() {
        // Both arguments are outside the allowed set; lhs is declared first.
        let err = check(
            &binary_decl(),
            &[
                BoundArgument::new("rhs", DType::I8),
                BoundArgument::new("lhs", DType::I32),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ConstraintError::DtypeNotAllowed { ref param, .. } if param == "lhs"));
    }

    #[test]
    fn test_mismatch_names_later_parameter() {
        let err = check(
            &binary_decl(),
            &[
                BoundArgument::new("lhs", DType::F32),
                BoundArgument::new("rhs", DType::F16),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConstraintError::DtypeMismatch {
                expected: DType::F32,
                got: DType::F16,
                param: "rhs".to_string()
            }
        );
    }

    #[test]
    fn test_optional_parameter_is_skipped() {
        let decl = binary_decl().param("bias", "T1");
        assert!(check(&decl, &[BoundArgument::new("lhs", DType::F32)]).is_ok());
    }

    #[test]
    fn test_unknown_parameter_and_undeclared_variable() {
        assert_eq!(
            check(&binary_decl(), &[BoundArgument::new("other", DType::F32)]),
            Err(ConstraintError::UnknownParameter("other".to_string()))
        );
        let decl = ConstraintDeclaration::new().param("input", "T9");
        assert_eq!(
            decl.validate(),
            Err(ConstraintError::UndeclaredTypeVariable("T9".to_string()))
        );
    }
}
