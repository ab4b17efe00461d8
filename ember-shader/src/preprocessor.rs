//! AST preprocessor: substitutes option bindings, folds constant
//! subexpressions, and prunes `Optional`/`Conditional` branches and
//! conditioned declaration members whose condition resolves to a bool.
//!
//! Grounded in `AstPreprocessor.cpp`: it never fails (unresolved conditions
//! are left in place for the back-end), options declared earlier are visible
//! to every later expression in program order, and `include` is resolved by
//! inlining the named library's top-level statements before recursing into
//! them with the same option map.

use std::collections::HashMap;

use crate::ast::{
    ConditionalBranch, ConstantValue, EntryFunctionDeclaration, Expression, ExternalVariable, ForLoop,
    FunctionDeclaration, OptionVariable, Statement, StageVariable, StructDeclaration, StructMember,
    VariableDeclaration,
};
use crate::evaluator;

/// Resolves an `include` library name to its top-level statements. Returning
/// `None` leaves the `Include` node in place, matching the "never fails" rule.
pub trait LibraryResolver {
    fn resolve(&self, name: &str) -> Option<Vec<Statement>>;
}

impl<F: Fn(&str) -> Option<Vec<Statement>>> LibraryResolver for F {
    fn resolve(&self, name: &str) -> Option<Vec<Statement>> {
        self(name)
    }
}

/// A resolver with no libraries; every `include` is left unresolved.
pub struct NoLibraries;
impl LibraryResolver for NoLibraries {
    fn resolve(&self, _name: &str) -> Option<Vec<Statement>> {
        None
    }
}

/// Preprocess a whole program against an external option map.
pub fn preprocess(program: &[Statement], options: &HashMap<String, ConstantValue>, libraries: &dyn LibraryResolver) -> Vec<Statement> {
    let mut env = HashMap::new();
    preprocess_sequence(program, &mut env, options, libraries)
}

fn preprocess_sequence(
    stmts: &[Statement],
    env: &mut HashMap<String, ConstantValue>,
    options: &HashMap<String, ConstantValue>,
    libraries: &dyn LibraryResolver,
) -> Vec<Statement> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        preprocess_into(stmt, env, options, libraries, &mut out);
    }
    out
}

fn fold_expr(expr: &Expression, env: &HashMap<String, ConstantValue>) -> Expression {
    if let Some(value) = evaluator::evaluate(expr, env) {
        return Expression::Constant(value);
    }
    match expr {
        Expression::Constant(v) => Expression::Constant(v.clone()),
        Expression::Variable(name) => match env.get(name) {
            Some(v) => Expression::Constant(v.clone()),
            None => Expression::Variable(name.clone()),
        },
        Expression::AccessIndex { base, index } => Expression::AccessIndex {
            base: Box::new(fold_expr(base, env)),
            index: Box::new(fold_expr(index, env)),
        },
        Expression::AccessIdentifier { base, identifier } => Expression::AccessIdentifier {
            base: Box::new(fold_expr(base, env)),
            identifier: identifier.clone(),
        },
        Expression::Swizzle { base, components } => {
            Expression::Swizzle { base: Box::new(fold_expr(base, env)), components: components.clone() }
        }
        Expression::Assignment { lhs, rhs } => {
            Expression::Assignment { lhs: Box::new(fold_expr(lhs, env)), rhs: Box::new(fold_expr(rhs, env)) }
        }
        Expression::Unary { op, operand } => Expression::Unary { op: *op, operand: Box::new(fold_expr(operand, env)) },
        Expression::Binary { op, lhs, rhs } => {
            Expression::Binary { op: *op, lhs: Box::new(fold_expr(lhs, env)), rhs: Box::new(fold_expr(rhs, env)) }
        }
        Expression::FunctionCall { name, args } => {
            Expression::FunctionCall { name: name.clone(), args: args.iter().map(|a| fold_expr(a, env)).collect() }
        }
        Expression::BuiltInFunctionCall { function, args } => Expression::BuiltInFunctionCall {
            function: function.clone(),
            args: args.iter().map(|a| fold_expr(a, env)).collect(),
        },
        Expression::Cast { target, args } => {
            Expression::Cast { target: target.clone(), args: args.iter().map(|a| fold_expr(a, env)).collect() }
        }
        Expression::Ternary { condition, then_branch, else_branch } => Expression::Ternary {
            condition: Box::new(fold_expr(condition, env)),
            then_branch: Box::new(fold_expr(then_branch, env)),
            else_branch: Box::new(fold_expr(else_branch, env)),
        },
    }
}

fn resolved_bool(expr: &Expression) -> Option<bool> {
    match expr {
        Expression::Constant(ConstantValue::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn preprocess_one(stmt: &Statement, env: &mut HashMap<String, ConstantValue>, options: &HashMap<String, ConstantValue>, libraries: &dyn LibraryResolver) -> Vec<Statement> {
    let mut out = Vec::new();
    preprocess_into(stmt, env, options, libraries, &mut out);
    out
}

fn preprocess_single(stmt: &Statement, env: &mut HashMap<String, ConstantValue>, options: &HashMap<String, ConstantValue>, libraries: &dyn LibraryResolver) -> Statement {
    let mut produced = preprocess_one(stmt, env, options, libraries);
    match produced.len() {
        1 => produced.pop().unwrap(),
        0 => Statement::Sequence(Vec::new()),
        _ => Statement::Sequence(produced),
    }
}

fn preprocess_into(
    stmt: &Statement,
    env: &mut HashMap<String, ConstantValue>,
    options: &HashMap<String, ConstantValue>,
    libraries: &dyn LibraryResolver,
    out: &mut Vec<Statement>,
) {
    match stmt {
        Statement::OptionDeclaration { variables } => {
            let mut new_vars = Vec::with_capacity(variables.len());
            for v in variables {
                let folded_default = v.default_value.as_ref().map(|e| fold_expr(e, env));
                let resolved = options
                    .get(&v.name)
                    .cloned()
                    .or_else(|| folded_default.as_ref().and_then(|e| if let Expression::Constant(c) = e { Some(c.clone()) } else { None }));
                if let Some(value) = &resolved {
                    env.insert(v.name.clone(), value.clone());
                }
                new_vars.push(OptionVariable {
                    name: v.name.clone(),
                    ty: v.ty.clone(),
                    default_value: resolved.map(Expression::Constant).or(folded_default),
                });
            }
            out.push(Statement::OptionDeclaration { variables: new_vars });
        }
        Statement::Conditional(branches) => {
            let mut kept_branches = Vec::new();
            let mut chosen: Option<Statement> = None;
            for branch in branches {
                let folded_condition = branch.condition.as_ref().map(|c| fold_expr(c, env));
                let resolved = match &folded_condition {
                    None => Some(true),
                    Some(c) => resolved_bool(c),
                };
                match resolved {
                    Some(true) => {
                        chosen = Some(preprocess_single(&branch.body, env, options, libraries));
                        break;
                    }
                    Some(false) => continue,
                    None => {
                        let body = preprocess_single(&branch.body, env, options, libraries);
                        kept_branches.push(ConditionalBranch { condition: folded_condition, body: Box::new(body) });
                    }
                }
            }
            if let Some(stmt) = chosen {
                out.push(stmt);
            } else if !kept_branches.is_empty() {
                out.push(Statement::Conditional(kept_branches));
            }
            // else: every branch resolved false and there was no else; the statement disappears.
        }
        Statement::Optional { condition, body } => {
            let folded = fold_expr(condition, env);
            match resolved_bool(&folded) {
                Some(true) => out.push(preprocess_single(body, env, options, libraries)),
                Some(false) => {}
                None => out.push(Statement::Optional { condition: folded, body: Box::new(preprocess_single(body, env, options, libraries)) }),
            }
        }
        Statement::Include(names) => {
            for name in names {
                match libraries.resolve(name) {
                    Some(lib) => {
                        for inner in &lib {
                            preprocess_into(inner, env, options, libraries, out);
                        }
                    }
                    None => out.push(Statement::Include(vec![name.clone()])),
                }
            }
        }
        Statement::StructDeclaration(decl) => {
            let members: Vec<StructMember> = decl
                .members
                .iter()
                .filter_map(|m| filter_conditioned(m.name.clone(), m.ty.clone(), m.condition.as_ref(), env, |name, ty, condition| StructMember { name, ty, condition }))
                .collect();
            if !members.is_empty() {
                out.push(Statement::StructDeclaration(StructDeclaration { name: decl.name.clone(), members }));
            }
        }
        Statement::InputDeclaration { stage, variables } => {
            let variables = filter_stage_variables(variables, env);
            if !variables.is_empty() {
                out.push(Statement::InputDeclaration { stage: stage.clone(), variables });
            }
        }
        Statement::OutputDeclaration { stage, variables } => {
            let variables = filter_stage_variables(variables, env);
            if !variables.is_empty() {
                out.push(Statement::OutputDeclaration { stage: stage.clone(), variables });
            }
        }
        Statement::ExternalDeclaration { variables } => {
            let variables: Vec<ExternalVariable> = variables
                .iter()
                .filter_map(|v| {
                    let keep = match v.condition.as_ref().map(|c| fold_expr(c, env)) {
                        Some(folded) => resolved_bool(&folded) != Some(false),
                        None => true,
                    };
                    keep.then(|| ExternalVariable {
                        name: v.name.clone(),
                        ty: v.ty.clone(),
                        set: v.set.as_ref().map(|e| fold_expr(e, env)),
                        binding: v.binding.as_ref().map(|e| fold_expr(e, env)),
                        layout: v.layout,
                        condition: v.condition.as_ref().map(|c| fold_expr(c, env)).filter(|c| resolved_bool(c).is_none()),
                    })
                })
                .collect();
            if !variables.is_empty() {
                out.push(Statement::ExternalDeclaration { variables });
            }
        }
        Statement::FunctionDeclaration(f) => {
            let body = preprocess_sequence(&f.body, env, options, libraries);
            out.push(Statement::FunctionDeclaration(FunctionDeclaration {
                name: f.name.clone(),
                return_type: f.return_type.clone(),
                parameters: f.parameters.clone(),
                body,
            }));
        }
        Statement::EntryFunctionDeclaration(e) => {
            let body = preprocess_sequence(&e.body, env, options, libraries);
            out.push(Statement::EntryFunctionDeclaration(EntryFunctionDeclaration { stage: e.stage.clone(), body }));
        }
        Statement::Sequence(inner) => {
            out.push(Statement::Sequence(preprocess_sequence(inner, env, options, libraries)));
        }
        Statement::VariableDeclaration(v) => {
            out.push(Statement::VariableDeclaration(VariableDeclaration {
                name: v.name.clone(),
                ty: v.ty.clone(),
                is_const: v.is_const,
                initializer: v.initializer.as_ref().map(|e| fold_expr(e, env)),
            }));
        }
        Statement::ExpressionStatement(e) => out.push(Statement::ExpressionStatement(fold_expr(e, env))),
        Statement::ForLoop(f) => {
            out.push(Statement::ForLoop(ForLoop {
                initialization: f.initialization.as_ref().map(|s| Box::new(preprocess_single(s, env, options, libraries))),
                condition: f.condition.as_ref().map(|c| fold_expr(c, env)),
                increment: f.increment.as_ref().map(|s| Box::new(preprocess_single(s, env, options, libraries))),
                body: Box::new(preprocess_single(&f.body, env, options, libraries)),
            }));
        }
        Statement::WhileLoop { condition, body } => out.push(Statement::WhileLoop {
            condition: fold_expr(condition, env),
            body: Box::new(preprocess_single(body, env, options, libraries)),
        }),
        Statement::DoWhileLoop { condition, body } => out.push(Statement::DoWhileLoop {
            condition: fold_expr(condition, env),
            body: Box::new(preprocess_single(body, env, options, libraries)),
        }),
        Statement::Return(expr) => out.push(Statement::Return(expr.as_ref().map(|e| fold_expr(e, env)))),
        Statement::Break => out.push(Statement::Break),
        Statement::Continue => out.push(Statement::Continue),
        Statement::Discard => out.push(Statement::Discard),
    }
}

fn filter_conditioned<T>(
    name: String,
    ty: crate::ast::Type,
    condition: Option<&Expression>,
    env: &HashMap<String, ConstantValue>,
    build: impl FnOnce(String, crate::ast::Type, Option<Expression>) -> T,
) -> Option<T> {
    match condition.map(|c| fold_expr(c, env)) {
        Some(folded) => match resolved_bool(&folded) {
            Some(false) => None,
            Some(true) => Some(build(name, ty, None)),
            None => Some(build(name, ty, Some(folded))),
        },
        None => Some(build(name, ty, None)),
    }
}

fn filter_stage_variables(variables: &[StageVariable], env: &HashMap<String, ConstantValue>) -> Vec<StageVariable> {
    variables
        .iter()
        .filter_map(|v| {
            let folded_condition = v.condition.as_ref().map(|c| fold_expr(c, env));
            if let Some(folded) = &folded_condition {
                if resolved_bool(folded) == Some(false) {
                    return None;
                }
            }
            let condition = folded_condition.filter(|c| resolved_bool(c).is_none());
            Some(StageVariable {
                name: v.name.clone(),
                ty: v.ty.clone(),
                location: v.location.as_ref().map(|e| fold_expr(e, env)),
                condition,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PrimitiveType;

    #[test]
    fn s2_option_gated_optional_block() {
        // option { int N = 4; } optional(N > 2) { int x = N; }
        let program = vec![
            Statement::OptionDeclaration {
                variables: vec![OptionVariable {
                    name: "N".into(),
                    ty: crate::ast::Type::Primitive(PrimitiveType::I32),
                    default_value: Some(Expression::Constant(ConstantValue::I32(4))),
                }],
            },
            Statement::Optional {
                condition: Expression::Binary {
                    op: crate::ast::BinaryOp::Greater,
                    lhs: Box::new(Expression::Variable("N".into())),
                    rhs: Box::new(Expression::Constant(ConstantValue::I32(2))),
                },
                body: Box::new(Statement::Sequence(vec![Statement::VariableDeclaration(VariableDeclaration {
                    name: "x".into(),
                    ty: crate::ast::Type::Primitive(PrimitiveType::I32),
                    is_const: false,
                    initializer: Some(Expression::Variable("N".into())),
                })])),
            },
        ];
        let out = preprocess(&program, &HashMap::new(), &NoLibraries);
        assert_eq!(out.len(), 2);
        match &out[1] {
            Statement::Sequence(inner) => match &inner[0] {
                Statement::VariableDeclaration(v) => {
                    assert_eq!(v.initializer, Some(Expression::Constant(ConstantValue::I32(4))));
                }
                other => panic!("unexpected statement {other:?}"),
            },
            other => panic!("expected the optional body inlined, got {other:?}"),
        }
    }

    #[test]
    fn s3_conditional_pruning_picks_first_true_branch() {
        // if (1 == 1) a(); else b();
        let program = vec![Statement::Conditional(vec![
            ConditionalBranch {
                condition: Some(Expression::Binary {
                    op: crate::ast::BinaryOp::Equal,
                    lhs: Box::new(Expression::Constant(ConstantValue::I32(1))),
                    rhs: Box::new(Expression::Constant(ConstantValue::I32(1))),
                }),
                body: Box::new(Statement::ExpressionStatement(Expression::FunctionCall { name: "a".into(), args: vec![] })),
            },
            ConditionalBranch {
                condition: None,
                body: Box::new(Statement::ExpressionStatement(Expression::FunctionCall { name: "b".into(), args: vec![] })),
            },
        ])];
        let out = preprocess(&program, &HashMap::new(), &NoLibraries);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0],
            Statement::ExpressionStatement(Expression::FunctionCall { name: "a".into(), args: vec![] })
        );
    }

    #[test]
    fn idempotent_on_already_preprocessed_tree() {
        let program = vec![Statement::ExpressionStatement(Expression::Constant(ConstantValue::I32(1)))];
        let once = preprocess(&program, &HashMap::new(), &NoLibraries);
        let twice = preprocess(&once, &HashMap::new(), &NoLibraries);
        assert_eq!(once, twice);
    }

    #[test]
    fn option_substitution_replaces_every_matching_variable() {
        let mut options = HashMap::new();
        options.insert("K".to_string(), ConstantValue::I32(7));
        let program = vec![
            Statement::OptionDeclaration {
                variables: vec![OptionVariable {
                    name: "K".into(),
                    ty: crate::ast::Type::Primitive(PrimitiveType::I32),
                    default_value: Some(Expression::Constant(ConstantValue::I32(0))),
                }],
            },
            Statement::ExpressionStatement(Expression::Variable("K".into())),
        ];
        let out = preprocess(&program, &options, &NoLibraries);
        assert_eq!(out[1], Statement::ExpressionStatement(Expression::Constant(ConstantValue::I32(7))));
    }
}
