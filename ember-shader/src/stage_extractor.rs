//! Stage extractor: given a whole-program AST and a stage name, produces a
//! new `Sequence` containing only what that stage can reach from its entry
//! point — grounded in `AstStageExtractor` being invoked by the GLSL writer
//! before it ever emits a line of text.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ast::{Expression, FunctionDeclaration, Statement, StructDeclaration, Type};

struct ProgramIndex<'a> {
    functions: HashMap<&'a str, &'a FunctionDeclaration>,
    structs: HashMap<&'a str, &'a StructDeclaration>,
    externals: HashSet<&'a str>,
}

fn build_index(program: &[Statement]) -> ProgramIndex<'_> {
    let mut functions = HashMap::new();
    let mut structs = HashMap::new();
    let mut externals = HashSet::new();
    for stmt in program {
        match stmt {
            Statement::FunctionDeclaration(f) => {
                functions.insert(f.name.as_str(), f);
            }
            Statement::StructDeclaration(s) => {
                structs.insert(s.name.as_str(), s);
            }
            Statement::ExternalDeclaration { variables } => {
                for v in variables {
                    externals.insert(v.name.as_str());
                }
            }
            _ => {}
        }
    }
    ProgramIndex { functions, structs, externals }
}

fn struct_names_in_type<'a>(ty: &'a Type, out: &mut Vec<&'a str>) {
    match ty {
        Type::Struct(name) => out.push(name),
        Type::Array { component, .. } => struct_names_in_type(component, out),
        _ => {}
    }
}

fn collect_expr(expr: &Expression, calls: &mut Vec<String>, vars: &mut Vec<String>, types: &mut Vec<String>) {
    match expr {
        Expression::Constant(_) | Expression::Variable(_) => {
            if let Expression::Variable(name) = expr {
                vars.push(name.clone());
            }
        }
        Expression::AccessIndex { base, index } => {
            collect_expr(base, calls, vars, types);
            collect_expr(index, calls, vars, types);
        }
        Expression::AccessIdentifier { base, .. } => collect_expr(base, calls, vars, types),
        Expression::Swizzle { base, .. } => collect_expr(base, calls, vars, types),
        Expression::Assignment { lhs, rhs } => {
            collect_expr(lhs, calls, vars, types);
            collect_expr(rhs, calls, vars, types);
        }
        Expression::Unary { operand, .. } => collect_expr(operand, calls, vars, types),
        Expression::Binary { lhs, rhs, .. } => {
            collect_expr(lhs, calls, vars, types);
            collect_expr(rhs, calls, vars, types);
        }
        Expression::FunctionCall { name, args } => {
            calls.push(name.clone());
            for a in args {
                collect_expr(a, calls, vars, types);
            }
        }
        Expression::BuiltInFunctionCall { args, .. } => {
            for a in args {
                collect_expr(a, calls, vars, types);
            }
        }
        Expression::Cast { target, args } => {
            let mut names = Vec::new();
            struct_names_in_type(target, &mut names);
            types.extend(names.into_iter().map(String::from));
            for a in args {
                collect_expr(a, calls, vars, types);
            }
        }
        Expression::Ternary { condition, then_branch, else_branch } => {
            collect_expr(condition, calls, vars, types);
            collect_expr(then_branch, calls, vars, types);
            collect_expr(else_branch, calls, vars, types);
        }
    }
}

fn collect_stmt(stmt: &Statement, calls: &mut Vec<String>, vars: &mut Vec<String>, types: &mut Vec<String>) {
    match stmt {
        Statement::Conditional(branches) => {
            for b in branches {
                if let Some(c) = &b.condition {
                    collect_expr(c, calls, vars, types);
                }
                collect_stmt(&b.body, calls, vars, types);
            }
        }
        Statement::ForLoop(f) => {
            if let Some(s) = &f.initialization {
                collect_stmt(s, calls, vars, types);
            }
            if let Some(c) = &f.condition {
                collect_expr(c, calls, vars, types);
            }
            if let Some(s) = &f.increment {
                collect_stmt(s, calls, vars, types);
            }
            collect_stmt(&f.body, calls, vars, types);
        }
        Statement::WhileLoop { condition, body } | Statement::DoWhileLoop { condition, body } => {
            collect_expr(condition, calls, vars, types);
            collect_stmt(body, calls, vars, types);
        }
        Statement::VariableDeclaration(v) => {
            let mut names = Vec::new();
            struct_names_in_type(&v.ty, &mut names);
            types.extend(names.into_iter().map(String::from));
            if let Some(init) = &v.initializer {
                collect_expr(init, calls, vars, types);
            }
        }
        Statement::ExpressionStatement(e) => collect_expr(e, calls, vars, types),
        Statement::Return(Some(e)) => collect_expr(e, calls, vars, types),
        Statement::Sequence(inner) => {
            for s in inner {
                collect_stmt(s, calls, vars, types);
            }
        }
        Statement::Optional { condition, body } => {
            collect_expr(condition, calls, vars, types);
            collect_stmt(body, calls, vars, types);
        }
        _ => {}
    }
}

fn reachable_from_body(body: &[Statement]) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut calls = Vec::new();
    let mut vars = Vec::new();
    let mut types = Vec::new();
    for s in body {
        collect_stmt(s, &mut calls, &mut vars, &mut types);
    }
    (calls, vars, types)
}

/// Extract the subset of `program` reachable from `stage`'s entry point.
/// If no `EntryFunctionDeclaration` matches `stage`, returns an empty sequence.
pub fn extract_stage(program: &[Statement], stage: &str) -> Vec<Statement> {
    let entry = program.iter().find_map(|s| match s {
        Statement::EntryFunctionDeclaration(e) if e.stage == stage => Some(e),
        _ => None,
    });
    let Some(entry) = entry else {
        return Vec::new();
    };

    let index = build_index(program);

    let mut reachable_functions: HashSet<String> = HashSet::new();
    let mut reachable_structs: HashSet<String> = HashSet::new();
    let mut reachable_externals: HashSet<String> = HashSet::new();

    let (entry_calls, entry_vars, entry_types) = reachable_from_body(&entry.body);
    let mut func_queue: VecDeque<String> = entry_calls.into();
    let mut struct_queue: VecDeque<String> = entry_types.into();
    for v in entry_vars {
        if index.externals.contains(v.as_str()) {
            reachable_externals.insert(v);
        }
    }

    loop {
        if let Some(name) = func_queue.pop_front() {
            if reachable_functions.insert(name.clone()) {
                if let Some(func) = index.functions.get(name.as_str()) {
                    let mut names = Vec::new();
                    struct_names_in_type(&func.return_type, &mut names);
                    for p in &func.parameters {
                        struct_names_in_type(&p.ty, &mut names);
                    }
                    for n in names {
                        struct_queue.push_back(n.to_string());
                    }
                    let (calls, vars, types) = reachable_from_body(&func.body);
                    for c in calls {
                        func_queue.push_back(c);
                    }
                    for t in types {
                        struct_queue.push_back(t);
                    }
                    for v in vars {
                        if index.externals.contains(v.as_str()) {
                            reachable_externals.insert(v);
                        }
                    }
                }
            }
            continue;
        }
        if let Some(name) = struct_queue.pop_front() {
            if reachable_structs.insert(name.clone()) {
                if let Some(decl) = index.structs.get(name.as_str()) {
                    for member in &decl.members {
                        let mut names = Vec::new();
                        struct_names_in_type(&member.ty, &mut names);
                        for n in names {
                            struct_queue.push_back(n.to_string());
                        }
                    }
                }
            }
            continue;
        }
        break;
    }

    // Post-order function emission: callees before callers.
    let mut ordered_functions = Vec::new();
    let mut visited = HashSet::new();
    fn visit_function<'a>(
        name: &str,
        index: &ProgramIndex<'a>,
        reachable: &HashSet<String>,
        visited: &mut HashSet<String>,
        out: &mut Vec<&'a FunctionDeclaration>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(func) = index.functions.get(name) {
            let (calls, _, _) = reachable_from_body(&func.body);
            for callee in calls {
                if reachable.contains(&callee) {
                    visit_function(&callee, index, reachable, visited, out);
                }
            }
            out.push(func);
        }
    }
    for name in &reachable_functions {
        visit_function(name, &index, &reachable_functions, &mut visited, &mut ordered_functions);
    }

    let mut ordered_structs = Vec::new();
    let mut struct_visited = HashSet::new();
    fn visit_struct<'a>(
        name: &str,
        index: &ProgramIndex<'a>,
        reachable: &HashSet<String>,
        visited: &mut HashSet<String>,
        out: &mut Vec<&'a StructDeclaration>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(decl) = index.structs.get(name) {
            for member in &decl.members {
                let mut names = Vec::new();
                struct_names_in_type(&member.ty, &mut names);
                for n in names {
                    if reachable.contains(n) {
                        visit_struct(n, index, reachable, visited, out);
                    }
                }
            }
            out.push(decl);
        }
    }
    for name in &reachable_structs {
        visit_struct(name, &index, &reachable_structs, &mut struct_visited, &mut ordered_structs);
    }

    let mut out = Vec::new();
    for stmt in program {
        if let Statement::OptionDeclaration { .. } = stmt {
            out.push(stmt.clone());
        }
    }
    for s in ordered_structs {
        out.push(Statement::StructDeclaration(s.clone()));
    }
    for stmt in program {
        if let Statement::ExternalDeclaration { variables } = stmt {
            let kept: Vec<_> = variables.iter().filter(|v| reachable_externals.contains(v.name.as_str())).cloned().collect();
            if !kept.is_empty() {
                out.push(Statement::ExternalDeclaration { variables: kept });
            }
        }
    }
    for stmt in program {
        match stmt {
            Statement::InputDeclaration { stage: s, variables } if s.as_deref().is_none() || s.as_deref() == Some(stage) => {
                out.push(Statement::InputDeclaration { stage: s.clone(), variables: variables.clone() });
            }
            Statement::OutputDeclaration { stage: s, variables } if s.as_deref().is_none() || s.as_deref() == Some(stage) => {
                out.push(Statement::OutputDeclaration { stage: s.clone(), variables: variables.clone() });
            }
            _ => {}
        }
    }
    for f in ordered_functions {
        out.push(Statement::FunctionDeclaration(f.clone()));
    }
    out.push(Statement::EntryFunctionDeclaration(entry.clone()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{EntryFunctionDeclaration, PrimitiveType};

    #[test]
    fn missing_entry_yields_empty_sequence() {
        let program = vec![Statement::FunctionDeclaration(FunctionDeclaration {
            name: "helper".into(),
            return_type: Type::Void,
            parameters: vec![],
            body: vec![],
        })];
        assert!(extract_stage(&program, "vertex").is_empty());
    }

    #[test]
    fn unreferenced_functions_are_dropped() {
        let used = FunctionDeclaration {
            name: "used".into(),
            return_type: Type::Void,
            parameters: vec![],
            body: vec![],
        };
        let unused = FunctionDeclaration {
            name: "unused".into(),
            return_type: Type::Void,
            parameters: vec![],
            body: vec![],
        };
        let entry = EntryFunctionDeclaration {
            stage: "vertex".into(),
            body: vec![Statement::ExpressionStatement(Expression::FunctionCall { name: "used".into(), args: vec![] })],
        };
        let program = vec![
            Statement::FunctionDeclaration(used),
            Statement::FunctionDeclaration(unused),
            Statement::EntryFunctionDeclaration(entry),
        ];
        let out = extract_stage(&program, "vertex");
        let names: Vec<&str> = out.iter().filter_map(|s| s.declared_name()).collect();
        assert!(names.contains(&"used"));
        assert!(!names.contains(&"unused"));
    }

    #[test]
    fn options_are_always_retained() {
        let program = vec![
            Statement::OptionDeclaration {
                variables: vec![crate::ast::OptionVariable {
                    name: "N".into(),
                    ty: Type::Primitive(PrimitiveType::I32),
                    default_value: None,
                }],
            },
            Statement::EntryFunctionDeclaration(EntryFunctionDeclaration { stage: "vertex".into(), body: vec![] }),
        ];
        let out = extract_stage(&program, "vertex");
        assert!(matches!(out[0], Statement::OptionDeclaration { .. }));
    }
}
