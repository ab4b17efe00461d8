//! Back-end writers. [`write_stage`] takes an already-preprocessed, already
//! stage-extracted statement list for a single stage and renders it to GLSL
//! source text, the way a back-end that only ever sees one stage at a time
//! would. [`write_native`] renders a whole program back to this crate's own
//! shader grammar — the form `ember_shader::parse` accepts — so that
//! `parse(source)` and `parse(&write_native(&parsed))` produce structurally
//! equal trees.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::*;
use crate::evaluator;

/// GLSL version and interface-block emission options.
#[derive(Debug, Clone, Copy)]
pub struct GlslSettings {
    pub version_major: u32,
    pub version_minor: u32,
    /// When true, struct-typed input/output/external variables are declared
    /// directly rather than wrapped in a named interface block.
    pub allow_legacy_uniform_structs: bool,
}

impl Default for GlslSettings {
    fn default() -> Self {
        GlslSettings { version_major: 4, version_minor: 5, allow_legacy_uniform_structs: false }
    }
}

fn interface_block_suffix(stage: &str) -> &'static str {
    match stage {
        "vertex" => "VS",
        "fragment" => "FS",
        _ => "CS",
    }
}

/// Render `program` (the statements already extracted for `stage`) to GLSL source.
pub fn write_stage(program: &[Statement], stage: &str, settings: &GlslSettings) -> String {
    let mut writer = Writer {
        out: String::new(),
        indent: 0,
        settings: *settings,
        stage: stage.to_string(),
        structs: HashMap::new(),
        interface_block_count: HashMap::new(),
    };
    writer.write_header();
    writer.new_line();
    for (i, stmt) in program.iter().enumerate() {
        writer.write_statement(stmt);
        if i + 1 != program.len() {
            writer.new_line();
            writer.new_line();
        }
    }
    writer.out
}

struct Writer {
    out: String,
    indent: u32,
    settings: GlslSettings,
    stage: String,
    structs: HashMap<String, StructDeclaration>,
    interface_block_count: HashMap<String, u32>,
}

impl Writer {
    fn new_line(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    fn begin_block(&mut self) {
        self.new_line();
        self.out.push('{');
        self.indent += 1;
        self.new_line();
    }

    fn end_block(&mut self) {
        self.indent -= 1;
        self.new_line();
        self.out.push('}');
    }

    fn delimiter(&mut self) {
        self.out.push(';');
    }

    fn write_header(&mut self) {
        let version = self.settings.version_major * 100 + self.settings.version_minor * 10;
        let _ = write!(self.out, "#version {version}");
        self.new_line();

        let mut extensions = Vec::new();
        if version < 420 {
            extensions.push("GL_ARB_shading_language_420pack");
        }
        if version < 410 {
            extensions.push("GL_ARB_separate_shader_objects");
        }
        for (i, ext) in extensions.iter().enumerate() {
            let _ = write!(self.out, "#extension {ext} : require");
            if i + 1 != extensions.len() {
                self.new_line();
            }
        }
        self.new_line();
    }

    fn write_layout_location(&mut self, location: &Option<Expression>) {
        self.out.push_str("layout(location = ");
        self.write_attr_value(location, 0);
        self.out.push(')');
    }

    fn write_layout_binding(&mut self, set: &Option<Expression>, binding: &Option<Expression>) {
        self.out.push_str("layout(set = ");
        self.write_attr_value(set, 0);
        self.out.push_str(", binding = ");
        self.write_attr_value(binding, 0);
        self.out.push(')');
    }

    fn write_attr_value(&mut self, expr: &Option<Expression>, default: i64) {
        match expr {
            Some(expr) => match evaluator::evaluate(expr, &HashMap::new()) {
                Some(value) => {
                    let _ = write!(self.out, "{value}");
                }
                None => self.write_expression(expr),
            },
            None => {
                let _ = write!(self.out, "{default}");
            }
        }
    }

    fn write_type(&mut self, ty: &Type) {
        match ty {
            Type::Void => self.out.push_str("void"),
            Type::Primitive(p) => self.out.push_str(primitive_name(*p)),
            Type::Vector { component, size } => {
                self.out.push_str(vector_prefix(*component));
                let _ = write!(self.out, "vec{size}");
            }
            Type::Matrix { cols, rows, .. } => {
                let _ = write!(self.out, "mat{rows}");
                if rows != cols {
                    let _ = write!(self.out, "x{cols}");
                }
            }
            Type::Sampler(SamplerType { dimension, component }) => {
                self.out.push_str(vector_prefix(*component));
                self.out.push_str("sampler");
                self.out.push_str(match dimension {
                    SamplerDimension::D1 => "1D",
                    SamplerDimension::D2 => "2D",
                    SamplerDimension::D3 => "3D",
                    SamplerDimension::Cube => "Cube",
                });
            }
            Type::Struct(name) => self.out.push_str(name),
            Type::Array { component, .. } => self.write_type(component),
        }
    }

    fn write_variable_declaration(&mut self, ty: &Type, name: &str, initializer: Option<&Expression>) {
        self.write_type(ty);
        let _ = write!(self.out, " {name}");
        if let Some(init) = initializer {
            self.out.push_str(" = ");
            self.write_expression(init);
        }
        self.delimiter();
    }

    fn write_function_call(&mut self, name: &str, args: &[Expression]) {
        let _ = write!(self.out, "{name}(");
        for (i, arg) in args.iter().enumerate() {
            self.write_expression(arg);
            if i + 1 != args.len() {
                self.out.push_str(", ");
            }
        }
        self.out.push(')');
    }

    fn write_interface_block(&mut self, struct_name: &str, instance_name: &str, suffix: &str) {
        let interface_name = format!("{struct_name}_{suffix}");
        let count = self.interface_block_count.entry(interface_name.clone()).or_insert(0);
        let ordinal = *count;
        *count += 1;
        let _ = write!(self.out, "{interface_name}{ordinal}");

        let members = self.structs.get(struct_name).cloned().map(|s| s.members).unwrap_or_default();
        self.begin_block();
        for (i, member) in members.iter().enumerate() {
            self.write_variable_declaration(&member.ty, &member.name, None);
            if i + 1 != members.len() {
                self.new_line();
            }
        }
        self.end_block();
        let _ = write!(self.out, " {instance_name}");
        self.delimiter();
    }

    fn write_stage_variable_list(&mut self, variables: &[StageVariable], keyword: &str) {
        for (i, variable) in variables.iter().enumerate() {
            self.write_layout_location(&variable.location);
            let _ = write!(self.out, " {keyword} ");
            if variable.ty.is_struct() && !self.settings.allow_legacy_uniform_structs {
                if let Type::Struct(name) = &variable.ty {
                    let suffix = format!("{}{}", if keyword == "in" { "I" } else { "O" }, interface_block_suffix(&self.stage));
                    self.write_interface_block(name, &variable.name, &suffix);
                }
            } else {
                self.write_variable_declaration(&variable.ty, &variable.name, None);
            }
            if i + 1 != variables.len() {
                self.new_line();
            }
        }
    }

    fn write_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Conditional(branches) => {
                for branch in branches {
                    if let Some(condition) = &branch.condition {
                        self.out.push_str("if (");
                        self.write_expression(condition);
                        self.out.push(')');
                    }
                    self.begin_block();
                    self.write_statement(&branch.body);
                    self.end_block();
                }
            }
            Statement::ForLoop(for_loop) => {
                self.out.push_str("for (");
                if let Some(init) = &for_loop.initialization {
                    self.write_statement(init);
                } else {
                    self.delimiter();
                }
                self.out.push(' ');
                if let Some(cond) = &for_loop.condition {
                    self.write_expression(cond);
                }
                self.out.push_str("; ");
                if let Some(inc) = &for_loop.increment {
                    if let Statement::ExpressionStatement(expr) = inc.as_ref() {
                        self.write_expression(expr);
                    }
                }
                self.out.push(')');
                self.begin_block();
                self.write_statement(&for_loop.body);
                self.end_block();
            }
            Statement::WhileLoop { condition, body } => {
                self.out.push_str("while (");
                self.write_expression(condition);
                self.out.push(')');
                self.begin_block();
                self.write_statement(body);
                self.end_block();
            }
            Statement::DoWhileLoop { condition, body } => {
                self.out.push_str("do");
                self.begin_block();
                self.write_statement(body);
                self.end_block();
                self.out.push_str(" while (");
                self.write_expression(condition);
                self.out.push(')');
                self.delimiter();
            }
            Statement::VariableDeclaration(v) => {
                if v.is_const {
                    self.out.push_str("const ");
                }
                self.write_variable_declaration(&v.ty, &v.name, v.initializer.as_ref());
            }
            Statement::StructDeclaration(s) => {
                let _ = write!(self.out, "struct {}", s.name);
                self.begin_block();
                for (i, member) in s.members.iter().enumerate() {
                    self.write_variable_declaration(&member.ty, &member.name, None);
                    if i + 1 != s.members.len() {
                        self.new_line();
                    }
                }
                self.end_block();
                self.delimiter();
                self.structs.insert(s.name.clone(), s.clone());
            }
            Statement::InputDeclaration { variables, .. } => self.write_stage_variable_list(variables, "in"),
            Statement::OutputDeclaration { variables, .. } => self.write_stage_variable_list(variables, "out"),
            Statement::ExternalDeclaration { variables } => {
                for (i, variable) in variables.iter().enumerate() {
                    self.write_layout_binding(&variable.set, &variable.binding);
                    self.out.push_str(" uniform ");
                    if variable.ty.is_struct() && !self.settings.allow_legacy_uniform_structs {
                        if let Type::Struct(name) = &variable.ty {
                            self.write_interface_block(name, &variable.name, "U");
                        }
                    } else {
                        self.write_variable_declaration(&variable.ty, &variable.name, None);
                    }
                    if i + 1 != variables.len() {
                        self.new_line();
                    }
                }
            }
            Statement::OptionDeclaration { variables } => {
                for (i, variable) in variables.iter().enumerate() {
                    let _ = write!(self.out, "#define {}", variable.name);
                    if let Some(value) = &variable.default_value {
                        self.out.push(' ');
                        self.write_expression(value);
                    }
                    if i + 1 != variables.len() {
                        self.new_line();
                    }
                }
            }
            Statement::FunctionDeclaration(f) => {
                self.write_type(&f.return_type);
                let _ = write!(self.out, " {}(", f.name);
                for (i, param) in f.parameters.iter().enumerate() {
                    self.write_type(&param.ty);
                    let _ = write!(self.out, " {}", param.name);
                    if i + 1 != f.parameters.len() {
                        self.out.push_str(", ");
                    }
                }
                self.out.push(')');
                self.begin_block();
                self.write_body(&f.body);
                self.end_block();
            }
            Statement::EntryFunctionDeclaration(e) => {
                self.out.push_str("void main()");
                self.begin_block();
                self.write_body(&e.body);
                self.end_block();
            }
            Statement::ExpressionStatement(expr) => {
                self.write_expression(expr);
                self.delimiter();
            }
            Statement::Break => {
                self.out.push_str("break");
                self.delimiter();
            }
            Statement::Continue => {
                self.out.push_str("continue");
                self.delimiter();
            }
            Statement::Return(expr) => {
                self.out.push_str("return");
                if let Some(expr) = expr {
                    self.out.push(' ');
                    self.write_expression(expr);
                }
                self.delimiter();
            }
            Statement::Discard => {
                self.out.push_str("discard");
                self.delimiter();
            }
            Statement::Sequence(statements) => self.write_body(statements),
            Statement::Optional { body, .. } => self.write_statement(body),
            Statement::Include(_) => {}
        }
    }

    fn write_body(&mut self, statements: &[Statement]) {
        for (i, stmt) in statements.iter().enumerate() {
            self.write_statement(stmt);
            if i + 1 != statements.len() {
                self.new_line();
                self.new_line();
            }
        }
    }

    fn write_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Constant(value) => {
                let _ = write!(self.out, "{value}");
            }
            Expression::Variable(name) => self.out.push_str(name),
            Expression::AccessIndex { base, index } => {
                self.write_expression(base);
                self.out.push('[');
                self.write_expression(index);
                self.out.push(']');
            }
            Expression::AccessIdentifier { base, identifier } => {
                self.write_expression(base);
                let _ = write!(self.out, ".{identifier}");
            }
            Expression::Swizzle { base, components } => {
                self.write_expression(base);
                self.out.push('.');
                for c in components {
                    self.out.push(c.letter());
                }
            }
            Expression::Assignment { lhs, rhs } => {
                self.write_expression(lhs);
                self.out.push_str(" = ");
                self.write_expression(rhs);
            }
            Expression::Unary { op, operand } => self.write_unary(*op, operand),
            Expression::Binary { op, lhs, rhs } => self.write_binary(*op, lhs, rhs),
            Expression::FunctionCall { name, args } => self.write_function_call(name, args),
            Expression::BuiltInFunctionCall { function, args } => self.write_builtin_call(function, args),
            Expression::Cast { target, args } => {
                self.write_type(target);
                self.out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    self.write_expression(arg);
                    if i + 1 != args.len() {
                        self.out.push_str(", ");
                    }
                }
                self.out.push(')');
            }
            Expression::Ternary { condition, then_branch, else_branch } => {
                self.out.push('(');
                self.write_expression(condition);
                self.out.push_str(" ? ");
                self.write_expression(then_branch);
                self.out.push_str(" : ");
                self.write_expression(else_branch);
                self.out.push(')');
            }
        }
    }

    fn write_unary(&mut self, op: UnaryOp, operand: &Expression) {
        let (prefix, suffix) = match op {
            UnaryOp::PreIncrement => ("++", ""),
            UnaryOp::PostIncrement => ("", "++"),
            UnaryOp::PreDecrement => ("--", ""),
            UnaryOp::PostDecrement => ("", "--"),
            UnaryOp::Plus => ("+", ""),
            UnaryOp::Negate => ("-", ""),
            UnaryOp::Not => ("!", ""),
        };
        self.out.push_str(prefix);
        self.write_expression(operand);
        self.out.push_str(suffix);
    }

    fn write_binary(&mut self, op: BinaryOp, lhs: &Expression, rhs: &Expression) {
        if let Some(name) = match op {
            BinaryOp::Power => Some("pow"),
            BinaryOp::Modulo => Some("mod"),
            _ => None,
        } {
            let _ = write!(self.out, "{name}(");
            self.write_expression(lhs);
            self.out.push_str(", ");
            self.write_expression(rhs);
            self.out.push(')');
            return;
        }

        let symbol = binary_symbol(op);
        let current_precedence = precedence(op);

        self.write_operand(lhs, current_precedence);
        let _ = write!(self.out, " {symbol} ");
        self.write_operand(rhs, current_precedence);
    }

    fn write_operand(&mut self, expr: &Expression, parent_precedence: u8) {
        if let Expression::Binary { op, .. } = expr {
            if precedence(*op) < parent_precedence {
                self.out.push('(');
                self.write_expression(expr);
                self.out.push(')');
                return;
            }
        }
        self.write_expression(expr);
    }

    fn write_builtin_call(&mut self, function: &BuiltInFunction, args: &[Expression]) {
        if matches!(function, BuiltInFunction::SetVertexPosition) {
            self.out.push_str("gl_Position = ");
            if let Some(first) = args.first() {
                self.write_expression(first);
            }
            return;
        }
        let name = match function {
            BuiltInFunction::Sample => "texture",
            BuiltInFunction::Normalize => "normalize",
            BuiltInFunction::Length => "length",
            BuiltInFunction::Distance => "distance",
            BuiltInFunction::Reflect => "reflect",
            other => other.name(),
        };
        self.write_function_call(name, args);
    }
}

fn primitive_name(p: PrimitiveType) -> &'static str {
    match p {
        PrimitiveType::Bool => "bool",
        PrimitiveType::I32 => "int",
        PrimitiveType::U32 => "uint",
        PrimitiveType::F32 => "float",
    }
}

fn vector_prefix(p: PrimitiveType) -> &'static str {
    match p {
        PrimitiveType::Bool => "b",
        PrimitiveType::I32 => "i",
        PrimitiveType::U32 => "u",
        PrimitiveType::F32 => "",
    }
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Subtract => "-",
        Multiply => "*",
        Divide => "/",
        BitXor => "^",
        BitAnd => "&",
        BitOr => "|",
        And => "&&",
        Or => "||",
        ShiftLeft => "<<",
        ShiftRight => ">>",
        Less => "<",
        Greater => ">",
        Equal => "==",
        NotEqual => "!=",
        LessEqual => "<=",
        GreaterEqual => ">=",
        Power | Modulo => unreachable!("handled before symbol lookup"),
    }
}

fn precedence(op: BinaryOp) -> u8 {
    use BinaryOp::*;
    match op {
        Or => 1,
        And => 2,
        BitOr => 3,
        BitXor => 4,
        BitAnd => 5,
        Equal | NotEqual => 6,
        Less | Greater | LessEqual | GreaterEqual => 7,
        ShiftLeft | ShiftRight => 8,
        Add | Subtract => 9,
        Multiply | Divide | Power | Modulo => 10,
    }
}

/// Render a whole program (typically a [`Statement::Sequence`] straight from
/// [`crate::parse`]) back to this crate's own shader grammar. Grounded in
/// Atema's `AtslShaderWriter`, which plays the same role for its ATSL
/// grammar: a second visitor alongside the GLSL one, writing the language's
/// own syntax instead of a target back-end's.
pub fn write_native(program: &Statement) -> String {
    let mut writer = NativeWriter { out: String::new(), indent: 0 };
    match program {
        Statement::Sequence(statements) => writer.write_body(statements),
        other => writer.write_statement(other),
    }
    writer.out
}

enum AttrValue<'a> {
    Ident(&'a str),
    Expr(&'a Expression),
}

struct NativeWriter {
    out: String,
    indent: u32,
}

impl NativeWriter {
    fn new_line(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    fn begin_block(&mut self) {
        self.new_line();
        self.out.push('{');
        self.indent += 1;
        self.new_line();
    }

    fn end_block(&mut self) {
        self.indent -= 1;
        self.new_line();
        self.out.push('}');
    }

    /// A loop/conditional body is either a brace-delimited [`Statement::Sequence`]
    /// or, since this grammar allows brace-less bodies like C does, a single bare
    /// statement. Writing a brace-less body back with braces would reparse it
    /// into a `Sequence`, which is a different tree — so the two forms must be
    /// told apart here the same way the parser's `parse_statement_or_block` does.
    fn write_block_or_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Sequence(statements) => {
                self.begin_block();
                self.write_body(statements);
                self.end_block();
            }
            other => {
                self.indent += 1;
                self.new_line();
                self.write_statement(other);
                self.indent -= 1;
            }
        }
    }

    fn write_attributes(&mut self, attrs: &[(&str, AttrValue)]) {
        if attrs.is_empty() {
            return;
        }
        self.out.push('[');
        for (i, (name, value)) in attrs.iter().enumerate() {
            let _ = write!(self.out, "{name}(");
            match value {
                AttrValue::Ident(ident) => self.out.push_str(ident),
                AttrValue::Expr(expr) => self.write_expression(expr),
            }
            self.out.push(')');
            if i + 1 != attrs.len() {
                self.out.push_str(", ");
            }
        }
        self.out.push(']');
    }

    fn write_type(&mut self, ty: &Type) {
        match ty {
            Type::Void => self.out.push_str("void"),
            Type::Primitive(p) => self.out.push_str(native_primitive_name(*p)),
            Type::Vector { component, size } => {
                let _ = write!(self.out, "vec{size}{}", native_component_suffix(*component));
            }
            Type::Matrix { rows, .. } => {
                let _ = write!(self.out, "mat{rows}f");
            }
            Type::Sampler(SamplerType { dimension, component }) => {
                self.out.push_str("sampler");
                self.out.push_str(match dimension {
                    SamplerDimension::D1 => "1D",
                    SamplerDimension::D2 => "2D",
                    SamplerDimension::D3 => "3D",
                    SamplerDimension::Cube => "Cube",
                });
                self.out.push_str(native_component_suffix(*component));
            }
            Type::Struct(name) => self.out.push_str(name),
            Type::Array { component, size } => {
                self.write_type(component);
                self.out.push('[');
                match size {
                    ArraySizeKind::Implicit => {}
                    ArraySizeKind::Constant(n) => {
                        let _ = write!(self.out, "{n}");
                    }
                    ArraySizeKind::Option(name) => self.out.push_str(name),
                }
                self.out.push(']');
            }
        }
    }

    fn write_variable_declaration(&mut self, ty: &Type, name: &str, initializer: Option<&Expression>) {
        self.write_type(ty);
        let _ = write!(self.out, " {name}");
        if let Some(init) = initializer {
            self.out.push_str(" = ");
            self.write_expression(init);
        }
        self.out.push(';');
    }

    fn write_stage_block(&mut self, keyword: &str, stage: &Option<String>, variables: &[StageVariable]) {
        if let Some(stage) = stage {
            self.write_attributes(&[("stage", AttrValue::Ident(stage))]);
            self.new_line();
        }
        self.out.push_str(keyword);
        if variables.len() != 1 {
            self.begin_block();
            for (i, variable) in variables.iter().enumerate() {
                self.write_stage_variable(variable);
                if i + 1 != variables.len() {
                    self.new_line();
                }
            }
            self.end_block();
        } else {
            self.out.push(' ');
            self.write_stage_variable(&variables[0]);
        }
    }

    fn write_stage_variable(&mut self, variable: &StageVariable) {
        let mut attrs = Vec::new();
        if let Some(location) = &variable.location {
            attrs.push(("location", AttrValue::Expr(location)));
        }
        if let Some(condition) = &variable.condition {
            attrs.push(("optional", AttrValue::Expr(condition)));
        }
        self.write_attributes(&attrs);
        self.out.push(' ');
        self.write_variable_declaration(&variable.ty, &variable.name, None);
    }

    fn write_external_block(&mut self, variables: &[ExternalVariable]) {
        self.out.push_str("external");
        if variables.len() != 1 {
            self.begin_block();
            for (i, variable) in variables.iter().enumerate() {
                self.write_external_variable(variable);
                if i + 1 != variables.len() {
                    self.new_line();
                }
            }
            self.end_block();
        } else {
            self.out.push(' ');
            self.write_external_variable(&variables[0]);
        }
    }

    fn write_external_variable(&mut self, variable: &ExternalVariable) {
        let mut attrs = Vec::new();
        if let Some(set) = &variable.set {
            attrs.push(("set", AttrValue::Expr(set)));
        }
        if let Some(binding) = &variable.binding {
            attrs.push(("binding", AttrValue::Expr(binding)));
        }
        if variable.layout == ExternalLayout::Std140 {
            attrs.push(("layout", AttrValue::Ident("std140")));
        }
        if let Some(condition) = &variable.condition {
            attrs.push(("optional", AttrValue::Expr(condition)));
        }
        self.write_attributes(&attrs);
        self.out.push(' ');
        self.write_variable_declaration(&variable.ty, &variable.name, None);
    }

    fn write_option_block(&mut self, variables: &[OptionVariable]) {
        self.out.push_str("option");
        if variables.len() > 1 {
            self.begin_block();
            for (i, variable) in variables.iter().enumerate() {
                self.write_variable_declaration(&variable.ty, &variable.name, variable.default_value.as_ref());
                if i + 1 != variables.len() {
                    self.new_line();
                }
            }
            self.end_block();
        } else {
            self.out.push(' ');
            self.write_variable_declaration(&variables[0].ty, &variables[0].name, variables[0].default_value.as_ref());
        }
    }

    fn write_struct(&mut self, s: &StructDeclaration) {
        let _ = write!(self.out, "struct {}", s.name);
        self.begin_block();
        for (i, member) in s.members.iter().enumerate() {
            if let Some(condition) = &member.condition {
                self.write_attributes(&[("optional", AttrValue::Expr(condition))]);
                self.out.push(' ');
            }
            self.write_variable_declaration(&member.ty, &member.name, None);
            if i + 1 != s.members.len() {
                self.new_line();
            }
        }
        self.end_block();
    }

    fn write_function(&mut self, f: &FunctionDeclaration) {
        self.write_type(&f.return_type);
        let _ = write!(self.out, " {}(", f.name);
        for (i, param) in f.parameters.iter().enumerate() {
            self.write_type(&param.ty);
            let _ = write!(self.out, " {}", param.name);
            if i + 1 != f.parameters.len() {
                self.out.push_str(", ");
            }
        }
        self.out.push(')');
        self.begin_block();
        self.write_body(&f.body);
        self.end_block();
    }

    /// The entry function's original return type, name and parameter list
    /// aren't kept on [`EntryFunctionDeclaration`] (only its stage and body
    /// are) — the parser discards them once it recognizes the `entry`
    /// attribute, so any legal zero-argument, `void`-returning signature
    /// reproduces the same node on reparse.
    fn write_entry_function(&mut self, e: &EntryFunctionDeclaration) {
        self.write_attributes(&[("entry", AttrValue::Ident(&e.stage))]);
        self.new_line();
        self.out.push_str("void main()");
        self.begin_block();
        self.write_body(&e.body);
        self.end_block();
    }

    fn write_conditional(&mut self, branches: &[ConditionalBranch]) {
        for (i, branch) in branches.iter().enumerate() {
            if i > 0 {
                self.new_line();
            }
            match &branch.condition {
                Some(condition) => {
                    if i > 0 {
                        self.out.push_str("else ");
                    }
                    self.out.push_str("if (");
                    self.write_expression(condition);
                    self.out.push(')');
                }
                None => self.out.push_str("else"),
            }
            self.write_block_or_statement(&branch.body);
        }
    }

    fn write_for(&mut self, for_loop: &ForLoop) {
        self.out.push_str("for (");
        match &for_loop.initialization {
            Some(stmt) => self.write_statement(stmt),
            None => self.out.push(';'),
        }
        self.out.push(' ');
        if let Some(condition) = &for_loop.condition {
            self.write_expression(condition);
        }
        self.out.push_str("; ");
        if let Some(increment) = &for_loop.increment {
            if let Statement::ExpressionStatement(expr) = increment.as_ref() {
                self.write_expression(expr);
            }
        }
        self.out.push(')');
        self.write_block_or_statement(&for_loop.body);
    }

    fn write_include(&mut self, names: &[String]) {
        let _ = write!(self.out, "include {}", names.join(", "));
        self.out.push(';');
    }

    fn write_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Conditional(branches) => self.write_conditional(branches),
            Statement::ForLoop(for_loop) => self.write_for(for_loop),
            Statement::WhileLoop { condition, body } => {
                self.out.push_str("while (");
                self.write_expression(condition);
                self.out.push(')');
                self.write_block_or_statement(body);
            }
            Statement::DoWhileLoop { condition, body } => {
                self.out.push_str("do");
                self.write_block_or_statement(body);
                self.out.push_str(" while (");
                self.write_expression(condition);
                self.out.push(')');
                self.out.push(';');
            }
            Statement::VariableDeclaration(v) => {
                if v.is_const {
                    self.out.push_str("const ");
                }
                self.write_variable_declaration(&v.ty, &v.name, v.initializer.as_ref());
            }
            Statement::StructDeclaration(s) => self.write_struct(s),
            Statement::InputDeclaration { stage, variables } => self.write_stage_block("input", stage, variables),
            Statement::OutputDeclaration { stage, variables } => self.write_stage_block("output", stage, variables),
            Statement::ExternalDeclaration { variables } => self.write_external_block(variables),
            Statement::OptionDeclaration { variables } => self.write_option_block(variables),
            Statement::FunctionDeclaration(f) => self.write_function(f),
            Statement::EntryFunctionDeclaration(e) => self.write_entry_function(e),
            Statement::ExpressionStatement(expr) => {
                self.write_expression(expr);
                self.out.push(';');
            }
            Statement::Break => self.out.push_str("break;"),
            Statement::Continue => self.out.push_str("continue;"),
            Statement::Return(expr) => {
                self.out.push_str("return");
                if let Some(expr) = expr {
                    self.out.push(' ');
                    self.write_expression(expr);
                }
                self.out.push(';');
            }
            Statement::Discard => self.out.push_str("discard;"),
            // A bare `{ ... }` block reached as an ordinary statement (as
            // opposed to the unwrapped root sequence `write_native` starts
            // from) must keep its braces, or reparsing would splice its
            // statements into the enclosing body instead of nesting them.
            Statement::Sequence(statements) => {
                self.begin_block();
                self.write_body(statements);
                self.end_block();
            }
            Statement::Optional { condition, body } => {
                self.out.push_str("optional (");
                self.write_expression(condition);
                self.out.push(')');
                self.write_block_or_statement(body);
            }
            Statement::Include(names) => self.write_include(names),
        }
    }

    fn write_body(&mut self, statements: &[Statement]) {
        for (i, stmt) in statements.iter().enumerate() {
            self.write_statement(stmt);
            if i + 1 != statements.len() {
                self.new_line();
                self.new_line();
            }
        }
    }

    fn write_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Constant(value) => self.write_constant(value),
            Expression::Variable(name) => self.out.push_str(name),
            Expression::AccessIndex { base, index } => {
                self.write_postfix_base(base);
                self.out.push('[');
                self.write_expression(index);
                self.out.push(']');
            }
            Expression::AccessIdentifier { base, identifier } => {
                self.write_postfix_base(base);
                let _ = write!(self.out, ".{identifier}");
            }
            Expression::Swizzle { base, components } => {
                self.write_postfix_base(base);
                self.out.push('.');
                for c in components {
                    self.out.push(c.letter());
                }
            }
            Expression::Assignment { lhs, rhs } => {
                self.write_expression(lhs);
                self.out.push_str(" = ");
                self.write_expression(rhs);
            }
            Expression::Unary { op, operand } => self.write_unary(*op, operand),
            Expression::Binary { op, lhs, rhs } => self.write_binary(*op, lhs, rhs),
            Expression::FunctionCall { name, args } => self.write_function_call(name, args),
            Expression::BuiltInFunctionCall { function, args } => self.write_function_call(function.name(), args),
            Expression::Cast { target, args } => {
                self.write_type(target);
                self.out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    self.write_expression(arg);
                    if i + 1 != args.len() {
                        self.out.push_str(", ");
                    }
                }
                self.out.push(')');
            }
            Expression::Ternary { condition, then_branch, else_branch } => {
                self.out.push('(');
                self.write_expression(condition);
                self.out.push_str(" ? ");
                self.write_expression(then_branch);
                self.out.push_str(" : ");
                self.write_expression(else_branch);
                self.out.push(')');
            }
        }
    }

    /// This grammar's `vecN{i,u,f}(...)` constant-vector spelling differs
    /// from `ConstantValue`'s `Display` impl (`ivec2`/`uvec2`/`vec2`), which
    /// was written to match GLSL's own naming. The parser never produces a
    /// vector-typed constant directly (`vec2f(1.0, 2.0)` parses as a `Cast`,
    /// not a folded `Constant`) — this only matters for constants an
    /// evaluator might fold later — but it has to use the parser's own
    /// names, not GLSL's, to stay reparsable.
    fn write_constant(&mut self, value: &ConstantValue) {
        use ConstantValue::*;
        match value {
            Bool(b) => {
                let _ = write!(self.out, "{b}");
            }
            I32(v) => {
                let _ = write!(self.out, "{v}");
            }
            U32(v) => {
                let _ = write!(self.out, "{v}u");
            }
            F32(v) => {
                let _ = write!(self.out, "{v:?}");
            }
            Vec2I([x, y]) => {
                let _ = write!(self.out, "vec2i({x}, {y})");
            }
            Vec3I([x, y, z]) => {
                let _ = write!(self.out, "vec3i({x}, {y}, {z})");
            }
            Vec4I([x, y, z, w]) => {
                let _ = write!(self.out, "vec4i({x}, {y}, {z}, {w})");
            }
            Vec2U([x, y]) => {
                let _ = write!(self.out, "vec2u({x}, {y})");
            }
            Vec3U([x, y, z]) => {
                let _ = write!(self.out, "vec3u({x}, {y}, {z})");
            }
            Vec4U([x, y, z, w]) => {
                let _ = write!(self.out, "vec4u({x}, {y}, {z}, {w})");
            }
            Vec2F([x, y]) => {
                let _ = write!(self.out, "vec2f({x:?}, {y:?})");
            }
            Vec3F([x, y, z]) => {
                let _ = write!(self.out, "vec3f({x:?}, {y:?}, {z:?})");
            }
            Vec4F([x, y, z, w]) => {
                let _ = write!(self.out, "vec4f({x:?}, {y:?}, {z:?}, {w:?})");
            }
        }
    }

    /// A binary, unary, assignment or ternary expression used as the base of
    /// a member/swizzle/index access needs parentheses: all of those bind
    /// tighter in `parse_postfix` than any of these, so writing them bare
    /// would let the access re-attach to the wrong sub-expression on reparse.
    fn write_postfix_base(&mut self, base: &Expression) {
        if matches!(base, Expression::Binary { .. } | Expression::Unary { .. } | Expression::Assignment { .. } | Expression::Ternary { .. }) {
            self.out.push('(');
            self.write_expression(base);
            self.out.push(')');
        } else {
            self.write_expression(base);
        }
    }

    fn write_unary(&mut self, op: UnaryOp, operand: &Expression) {
        let (prefix, suffix) = match op {
            UnaryOp::PreIncrement => ("++", ""),
            UnaryOp::PostIncrement => ("", "++"),
            UnaryOp::PreDecrement => ("--", ""),
            UnaryOp::PostDecrement => ("", "--"),
            UnaryOp::Plus => ("+", ""),
            UnaryOp::Negate => ("-", ""),
            UnaryOp::Not => ("!", ""),
        };
        self.out.push_str(prefix);
        self.write_expression(operand);
        self.out.push_str(suffix);
    }

    fn write_binary(&mut self, op: BinaryOp, lhs: &Expression, rhs: &Expression) {
        let symbol = native_binary_symbol(op);
        let current_precedence = precedence(op);
        self.write_operand(lhs, current_precedence);
        let _ = write!(self.out, " {symbol} ");
        self.write_operand(rhs, current_precedence);
    }

    fn write_operand(&mut self, expr: &Expression, parent_precedence: u8) {
        if let Expression::Binary { op, .. } = expr {
            if precedence(*op) < parent_precedence {
                self.out.push('(');
                self.write_expression(expr);
                self.out.push(')');
                return;
            }
        }
        self.write_expression(expr);
    }

    fn write_function_call(&mut self, name: &str, args: &[Expression]) {
        let _ = write!(self.out, "{name}(");
        for (i, arg) in args.iter().enumerate() {
            self.write_expression(arg);
            if i + 1 != args.len() {
                self.out.push_str(", ");
            }
        }
        self.out.push(')');
    }
}

fn native_primitive_name(p: PrimitiveType) -> &'static str {
    match p {
        PrimitiveType::Bool => "bool",
        PrimitiveType::I32 => "int",
        PrimitiveType::U32 => "uint",
        PrimitiveType::F32 => "float",
    }
}

fn native_component_suffix(p: PrimitiveType) -> &'static str {
    match p {
        PrimitiveType::F32 => "f",
        PrimitiveType::I32 => "i",
        PrimitiveType::U32 => "u",
        PrimitiveType::Bool => "",
    }
}

/// Unlike GLSL, this grammar has direct operator tokens for both `Power`
/// (`**`, see `TokenKind::StarStar`) and `Modulo` (`%`), so the native writer
/// never needs the `pow`/`mod` function-call rewrite the GLSL writer does.
fn native_binary_symbol(op: BinaryOp) -> &'static str {
    use BinaryOp::*;
    match op {
        Add => "+",
        Subtract => "-",
        Multiply => "*",
        Divide => "/",
        Power => "**",
        Modulo => "%",
        BitXor => "^",
        BitAnd => "&",
        BitOr => "|",
        And => "&&",
        Or => "||",
        ShiftLeft => "<<",
        ShiftRight => ">>",
        Less => "<",
        Greater => ">",
        Equal => "==",
        NotEqual => "!=",
        LessEqual => "<=",
        GreaterEqual => ">=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_entry_function_with_gl_position() {
        let program = vec![Statement::EntryFunctionDeclaration(EntryFunctionDeclaration {
            stage: "vertex".to_string(),
            body: vec![Statement::ExpressionStatement(Expression::BuiltInFunctionCall {
                function: BuiltInFunction::SetVertexPosition,
                args: vec![Expression::Variable("position".to_string())],
            })],
        })];
        let glsl = write_stage(&program, "vertex", &GlslSettings::default());
        assert!(glsl.contains("void main()"));
        assert!(glsl.contains("gl_Position = position"));
    }

    #[test]
    fn writes_power_and_modulo_as_function_calls() {
        let expr = Expression::Binary {
            op: BinaryOp::Power,
            lhs: Box::new(Expression::Constant(ConstantValue::F32(2.0))),
            rhs: Box::new(Expression::Constant(ConstantValue::F32(3.0))),
        };
        let program = vec![Statement::ExpressionStatement(expr)];
        let glsl = write_stage(&program, "fragment", &GlslSettings::default());
        assert!(glsl.contains("pow(2.0, 3.0)"));
    }

    #[test]
    fn writes_struct_as_interface_block_for_stage_io() {
        let program = vec![
            Statement::StructDeclaration(StructDeclaration {
                name: "VertexData".to_string(),
                members: vec![StructMember { name: "uv".to_string(), ty: Type::Vector { component: PrimitiveType::F32, size: 2 }, condition: None }],
            }),
            Statement::OutputDeclaration {
                stage: Some("vertex".to_string()),
                variables: vec![StageVariable { name: "v_out".to_string(), ty: Type::Struct("VertexData".to_string()), location: Some(Expression::Constant(ConstantValue::U32(0))), condition: None }],
            },
        ];
        let glsl = write_stage(&program, "vertex", &GlslSettings::default());
        assert!(glsl.contains("VertexData_OVS0"));
    }

    #[test]
    fn parenthesizes_lower_precedence_subexpression() {
        let expr = Expression::Binary {
            op: BinaryOp::Multiply,
            lhs: Box::new(Expression::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expression::Constant(ConstantValue::I32(1))),
                rhs: Box::new(Expression::Constant(ConstantValue::I32(2))),
            }),
            rhs: Box::new(Expression::Constant(ConstantValue::I32(3))),
        };
        let program = vec![Statement::ExpressionStatement(expr)];
        let glsl = write_stage(&program, "fragment", &GlslSettings::default());
        assert!(glsl.contains("(1 + 2) * 3"));
    }

    fn assert_round_trips(source: &str) {
        let parsed = crate::parse(source).unwrap();
        let rewritten = write_native(&parsed);
        let reparsed = crate::parse(&rewritten).unwrap_or_else(|err| panic!("rewritten source failed to reparse: {err}\n---\n{rewritten}"));
        assert_eq!(parsed, reparsed, "round-trip mismatch\n--- rewritten ---\n{rewritten}");
    }

    #[test]
    fn native_writer_round_trips_declarations_and_stage_blocks() {
        assert_round_trips(
            "\
option { int sample_count = 4; }
[stage(vertex)]
input {
\t[location(0)] vec3f position;
\t[location(1)] vec2f uv;
}
external {
\t[set(0), binding(0)] sampler2Df albedo;
\t[set(0), binding(1), layout(std140)] mat4f view_proj;
}
struct Light {
\tvec3f position;
\t[optional(sample_count > 1)] float radius;
}
",
        );
    }

    #[test]
    fn native_writer_round_trips_control_flow_and_braceless_bodies() {
        assert_round_trips(
            "\
[entry(fragment)]
void main() {
\tint total = 0;
\tfor (int i = 0; i < 4; i++)
\t\ttotal = total + i;
\twhile (total > 10)
\t\ttotal--;
\tif (total == 0)
\t\tdiscard;
\telse if (total < 0) {
\t\ttotal = -total;
\t}
\telse
\t\ttotal = total % 3;
\tdo
\t\ttotal++;
\twhile (total < 2);
}
",
        );
    }

    #[test]
    fn native_writer_round_trips_expressions_needing_parens() {
        assert_round_trips(
            "\
[entry(fragment)]
void main() {
\tvec4f a = vec4f(1.0, 2.0, 3.0, 4.0);
\tfloat b = (a + a).x;
\tfloat c = 2.0 ** 3.0;
\tfloat d = a.x > a.y ? a.x : a.y;
\tfloat e = -a.x;
}
",
        );
    }

    #[test]
    fn native_writer_round_trips_dotted_include() {
        assert_round_trips("include Atema.GBufferWrite.Options;\ninclude Atema.GBufferWrite.albedo, Atema.GBufferWrite.normal;\n");
    }
}
