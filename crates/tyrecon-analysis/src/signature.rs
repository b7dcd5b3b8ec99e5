//! Function signature recovery.
//!
//! Merges the call sites of a code class into one signature. Arguments are
//! joined position by position across sites; the return type is joined over
//! the sites that use the result.

use tyrecon_core::{ClassId, TypeVarId};
use tyrecon_types::{DataType, FunctionType};

use crate::annotation::Annotation;
use crate::constraint::CallSiteConstraint;
use crate::error::Result;
use crate::resolver::Resolver;

/// Recovers the signature of a code class from its call sites, in trace
/// order.
pub fn recover(
    resolver: &mut Resolver<'_>,
    class: ClassId,
    sites: &[CallSiteConstraint],
) -> Result<FunctionType> {
    let mut ret = DataType::Void;
    for var in sites.iter().filter_map(|s| s.ret) {
        ret = ret.join(&arg_type(resolver, var)?);
    }

    let mut arities: Vec<usize> = Vec::new();
    for site in sites {
        if !arities.contains(&site.args.len()) {
            arities.push(site.args.len());
        }
    }
    if arities.len() > 1 {
        resolver.annotate(Annotation::DivergentArity { class, arities });
        let mut func = FunctionType::untyped();
        func.ret = Box::new(ret);
        return Ok(func);
    }

    let arity = arities.first().copied().unwrap_or(0);
    let mut params = Vec::with_capacity(arity);
    for index in 0..arity {
        let mut param = DataType::Void;
        let mut seen = Vec::with_capacity(sites.len());
        for site in sites {
            let arg = arg_type(resolver, site.args[index])?;
            param = param.join(&arg);
            seen.push(arg);
        }
        // A union passed as is was already reported on its own class.
        if matches!(param, DataType::Union(_)) && !seen.contains(&param) {
            resolver.annotate(Annotation::ParamConflict { class, index });
        }
        params.push(param);
    }

    Ok(FunctionType::new(params, ret))
}

fn arg_type(resolver: &mut Resolver<'_>, var: TypeVarId) -> Result<DataType> {
    Ok(resolver.resolve_var(var)?.unwrap_or(DataType::Void))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::constraint::ConstraintKind;
    use crate::equivalence::TypeArena;
    use crate::store::UseSite;

    struct Sites {
        arena: TypeArena,
        code: TypeVarId,
    }

    impl Sites {
        fn new() -> Self {
            let mut arena = TypeArena::new();
            let code = arena.new_variable(UseSite::Storage { name: "fn".into() });
            Self { arena, code }
        }

        fn value(&mut self, evidence: Option<ConstraintKind>) -> TypeVarId {
            let var = self.arena.new_variable(UseSite::Storage {
                name: format!("v{}", self.arena.variable_count()),
            });
            if let Some(kind) = evidence {
                self.arena.add_constraint(var, 0, kind).unwrap();
            }
            var
        }

        fn call(&mut self, args: Vec<TypeVarId>, ret: Option<TypeVarId>) {
            self.arena
                .add_constraint(
                    self.code,
                    0,
                    ConstraintKind::CallSite(CallSiteConstraint { args, ret }),
                )
                .unwrap();
        }

        fn resolve(mut self) -> (DataType, Vec<Annotation>) {
            let config = AnalysisConfig::lp64();
            let notes = Resolver::new(&mut self.arena, &config)
                .resolve_all()
                .unwrap();
            (self.arena.type_of(self.code).cloned().unwrap(), notes)
        }
    }

    #[test]
    fn test_zero_argument_discarding_sites_are_void_fn() {
        let mut sites = Sites::new();
        sites.call(Vec::new(), None);
        sites.call(Vec::new(), None);
        let (ty, notes) = sites.resolve();
        assert_eq!(
            ty,
            DataType::Function(FunctionType::new(Vec::new(), DataType::Void))
        );
        assert!(notes.is_empty());
    }

    #[test]
    fn test_arguments_join_positionally() {
        let mut sites = Sites::new();
        let a = sites.value(Some(ConstraintKind::Size { width: 1 }));
        let b = sites.value(Some(ConstraintKind::Size { width: 2 }));
        let r = sites.value(Some(ConstraintKind::Size { width: 1 }));
        sites.call(vec![a], None);
        sites.call(vec![b], Some(r));
        let (ty, _) = sites.resolve();
        assert_eq!(
            ty,
            DataType::Function(FunctionType::new(
                vec![DataType::integer(2)],
                DataType::byte()
            ))
        );
    }

    #[test]
    fn test_divergent_arity_is_untyped() {
        let mut sites = Sites::new();
        let a = sites.value(None);
        sites.call(vec![a], None);
        sites.call(Vec::new(), None);
        let (ty, notes) = sites.resolve();
        assert_eq!(ty, DataType::Function(FunctionType::untyped()));
        assert_eq!(
            notes,
            [Annotation::DivergentArity {
                class: ClassId::new(0),
                arities: vec![1, 0]
            }]
        );
    }

    #[test]
    fn test_param_conflict() {
        let mut sites = Sites::new();
        let target = sites.value(None);
        let n = sites.value(Some(ConstraintKind::Constant { width: 1 }));
        let p = sites.value(Some(ConstraintKind::PointsTo { target }));
        sites.call(vec![n], None);
        sites.call(vec![p], None);
        let (ty, notes) = sites.resolve();
        let DataType::Function(func) = ty else {
            panic!("expected function");
        };
        assert!(matches!(func.params[0], DataType::Union(_)));
        assert_eq!(
            notes,
            [Annotation::ParamConflict {
                class: ClassId::new(0),
                index: 0
            }]
        );
    }

    #[test]
    fn test_union_argument_is_not_a_param_conflict() {
        let mut sites = Sites::new();
        let target = sites.value(None);
        let mixed = sites.value(Some(ConstraintKind::Constant { width: 1 }));
        sites
            .arena
            .add_constraint(mixed, 1, ConstraintKind::PointsTo { target })
            .unwrap();
        sites.call(vec![mixed], None);
        sites.call(vec![mixed], None);
        let (ty, notes) = sites.resolve();
        let DataType::Function(func) = ty else {
            panic!("expected function");
        };
        assert!(matches!(func.params[0], DataType::Union(_)));
        assert!(notes
            .iter()
            .any(|n| matches!(n, Annotation::KindConflict { .. })));
        assert!(!notes
            .iter()
            .any(|n| matches!(n, Annotation::ParamConflict { .. })));
    }
}
