//! Recursive-descent / precedence-climbing parser producing a root
//! [`Statement::Sequence`] from shader source text, per §4.3's grammar.

mod token;

use std::collections::HashMap;

use crate::ast::*;
use crate::error::{ParseError, SourceLocation};
use token::{tokenize, Token, TokenKind};

/// Parse a whole shader source string into a root `Sequence` of top-level declarations.
pub fn parse(source: &str) -> Result<Statement, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let mut statements = Vec::new();
    while !parser.at_eof() {
        statements.push(parser.parse_top_level_statement()?);
    }
    Ok(Statement::Sequence(statements))
}

fn primitive_type(name: &str) -> Option<Type> {
    use PrimitiveType::*;
    let vec = |c, n| Type::Vector { component: c, size: n };
    Some(match name {
        "void" => Type::Void,
        "bool" => Type::Primitive(Bool),
        "int" => Type::Primitive(I32),
        "uint" => Type::Primitive(U32),
        "float" => Type::Primitive(F32),
        "vec2f" => vec(F32, 2),
        "vec3f" => vec(F32, 3),
        "vec4f" => vec(F32, 4),
        "vec2i" => vec(I32, 2),
        "vec3i" => vec(I32, 3),
        "vec4i" => vec(I32, 4),
        "vec2u" => vec(U32, 2),
        "vec3u" => vec(U32, 3),
        "vec4u" => vec(U32, 4),
        "mat2f" => Type::Matrix { component: F32, cols: 2, rows: 2 },
        "mat3f" => Type::Matrix { component: F32, cols: 3, rows: 3 },
        "mat4f" => Type::Matrix { component: F32, cols: 4, rows: 4 },
        "sampler2Df" => Type::Sampler(SamplerType { dimension: SamplerDimension::D2, component: F32 }),
        "sampler2Di" => Type::Sampler(SamplerType { dimension: SamplerDimension::D2, component: I32 }),
        "sampler2Du" => Type::Sampler(SamplerType { dimension: SamplerDimension::D2, component: U32 }),
        "sampler3Df" => Type::Sampler(SamplerType { dimension: SamplerDimension::D3, component: F32 }),
        "samplerCubef" => Type::Sampler(SamplerType { dimension: SamplerDimension::Cube, component: F32 }),
        _ => return None,
    })
}

fn known_builtin_name(name: &str) -> bool {
    !matches!(BuiltInFunction::from_name(name), BuiltInFunction::Other(_))
}

const KEYWORDS: &[&str] = &[
    "option", "input", "output", "external", "struct", "if", "else", "for", "while", "do", "break", "continue",
    "return", "discard", "const", "optional", "include", "true", "false",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn at_eof(&self) -> bool {
        matches!(self.tokens[self.pos].kind, TokenKind::Eof)
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].kind
    }

    fn location(&self) -> SourceLocation {
        self.tokens[self.pos].location
    }

    fn advance(&mut self) -> TokenKind {
        let tok = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &TokenKind, description: &str) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                location: self.location(),
                found: format!("{:?}", self.peek()),
                expected: description.to_string(),
            })
        }
    }

    fn expect_ident(&mut self, description: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(ParseError::UnexpectedToken { location: self.location(), found: format!("{other:?}"), expected: description.to_string() }),
        }
    }

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(n) if n == word)
    }

    fn peek_ident_is_type(&self, offset: usize) -> bool {
        matches!(self.peek_at(offset), TokenKind::Ident(name) if primitive_type(name).is_some() || !KEYWORDS.contains(&name.as_str()))
    }

    // --- attributes -----------------------------------------------------

    fn parse_attributes(&mut self) -> Result<HashMap<String, Expression>, ParseError> {
        let mut attrs = HashMap::new();
        while matches!(self.peek(), TokenKind::LBracket) {
            self.advance();
            loop {
                let name = self.expect_ident("attribute name")?;
                self.expect(&TokenKind::LParen, "(")?;
                let value = self.parse_expression()?;
                self.expect(&TokenKind::RParen, ")")?;
                attrs.insert(name, value);
                if matches!(self.peek(), TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect(&TokenKind::RBracket, "]")?;
        }
        Ok(attrs)
    }

    fn attr_as_ident(expr: &Expression) -> Option<String> {
        match expr {
            Expression::Variable(name) => Some(name.clone()),
            _ => None,
        }
    }

    // --- top-level / statements ------------------------------------------

    fn parse_top_level_statement(&mut self) -> Result<Statement, ParseError> {
        self.parse_statement()
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let attrs = self.parse_attributes()?;

        if self.peek_keyword("input") {
            self.advance();
            return self.parse_stage_block(attrs, true);
        }
        if self.peek_keyword("output") {
            self.advance();
            return self.parse_stage_block(attrs, false);
        }
        if self.peek_keyword("external") {
            self.advance();
            return self.parse_external_block();
        }
        if self.peek_keyword("option") {
            self.advance();
            return self.parse_option_block();
        }
        if self.peek_keyword("struct") {
            self.advance();
            return self.parse_struct_decl();
        }
        if self.peek_keyword("include") {
            self.advance();
            return self.parse_include();
        }
        if self.peek_keyword("optional") {
            self.advance();
            self.expect(&TokenKind::LParen, "(")?;
            let condition = self.parse_expression()?;
            self.expect(&TokenKind::RParen, ")")?;
            let body = Box::new(self.parse_statement_or_block()?);
            return Ok(Statement::Optional { condition, body });
        }
        if self.peek_keyword("if") {
            return self.parse_conditional();
        }
        if self.peek_keyword("for") {
            return self.parse_for();
        }
        if self.peek_keyword("while") {
            return self.parse_while();
        }
        if self.peek_keyword("do") {
            return self.parse_do_while();
        }
        if self.peek_keyword("break") {
            self.advance();
            self.expect(&TokenKind::Semicolon, ";")?;
            return Ok(Statement::Break);
        }
        if self.peek_keyword("continue") {
            self.advance();
            self.expect(&TokenKind::Semicolon, ";")?;
            return Ok(Statement::Continue);
        }
        if self.peek_keyword("return") {
            self.advance();
            let expr = if matches!(self.peek(), TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
            self.expect(&TokenKind::Semicolon, ";")?;
            return Ok(Statement::Return(expr));
        }
        if self.peek_keyword("discard") {
            self.advance();
            self.expect(&TokenKind::Semicolon, ";")?;
            return Ok(Statement::Discard);
        }
        if matches!(self.peek(), TokenKind::LBrace) {
            return self.parse_block();
        }

        let is_const = self.peek_keyword("const");
        if is_const {
            self.advance();
        }

        if is_const || (self.peek_ident_is_type(0) && matches!(self.peek_at(1), TokenKind::Ident(_))) {
            return self.parse_declaration(is_const, attrs);
        }

        let expr = self.parse_expression()?;
        self.expect(&TokenKind::Semicolon, ";")?;
        Ok(Statement::ExpressionStatement(expr))
    }

    fn parse_statement_or_block(&mut self) -> Result<Statement, ParseError> {
        if matches!(self.peek(), TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.parse_statement()
        }
    }

    fn parse_block(&mut self) -> Result<Statement, ParseError> {
        self.expect(&TokenKind::LBrace, "{")?;
        let mut statements = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace) {
            statements.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace, "}")?;
        Ok(Statement::Sequence(statements))
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let name = self.expect_ident("type name")?;
        let base = primitive_type(&name).unwrap_or(Type::Struct(name));
        if matches!(self.peek(), TokenKind::LBracket) {
            self.advance();
            let size = if matches!(self.peek(), TokenKind::RBracket) {
                ArraySizeKind::Implicit
            } else if let TokenKind::IntLiteral(v, _) = self.peek().clone() {
                self.advance();
                ArraySizeKind::Constant(v as u32)
            } else {
                let opt_name = self.expect_ident("array size option")?;
                ArraySizeKind::Option(opt_name)
            };
            self.expect(&TokenKind::RBracket, "]")?;
            return Ok(Type::Array { component: Box::new(base), size });
        }
        Ok(base)
    }

    fn parse_declaration(&mut self, is_const: bool, attrs: HashMap<String, Expression>) -> Result<Statement, ParseError> {
        let ty = self.parse_type()?;
        let name = self.expect_ident("declaration name")?;

        if matches!(self.peek(), TokenKind::LParen) {
            return self.parse_function_decl(ty, name, attrs);
        }

        let initializer = if matches!(self.peek(), TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon, ";")?;
        Ok(Statement::VariableDeclaration(VariableDeclaration { name, ty, is_const, initializer }))
    }

    fn parse_function_decl(&mut self, return_type: Type, name: String, attrs: HashMap<String, Expression>) -> Result<Statement, ParseError> {
        self.expect(&TokenKind::LParen, "(")?;
        let mut parameters = Vec::new();
        while !matches!(self.peek(), TokenKind::RParen) {
            let ty = self.parse_type()?;
            let pname = self.expect_ident("parameter name")?;
            parameters.push(Parameter { name: pname, ty });
            if matches!(self.peek(), TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(&TokenKind::RParen, ")")?;
        self.expect(&TokenKind::LBrace, "{")?;
        let mut body = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace) {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace, "}")?;

        let stage = attrs.get("entry").or_else(|| attrs.get("stage")).and_then(Self::attr_as_ident);
        if let Some(stage) = stage {
            Ok(Statement::EntryFunctionDeclaration(EntryFunctionDeclaration { stage, body }))
        } else {
            Ok(Statement::FunctionDeclaration(FunctionDeclaration { name, return_type, parameters, body }))
        }
    }

    fn parse_stage_block(&mut self, attrs: HashMap<String, Expression>, is_input: bool) -> Result<Statement, ParseError> {
        let stage = attrs.get("stage").and_then(Self::attr_as_ident);
        let mut variables = Vec::new();
        if matches!(self.peek(), TokenKind::LBrace) {
            self.advance();
            while !matches!(self.peek(), TokenKind::RBrace) {
                variables.push(self.parse_stage_variable()?);
            }
            self.expect(&TokenKind::RBrace, "}")?;
        } else {
            variables.push(self.parse_stage_variable()?);
        }
        if is_input {
            Ok(Statement::InputDeclaration { stage, variables })
        } else {
            Ok(Statement::OutputDeclaration { stage, variables })
        }
    }

    fn parse_stage_variable(&mut self) -> Result<StageVariable, ParseError> {
        let attrs = self.parse_attributes()?;
        let ty = self.parse_type()?;
        let name = self.expect_ident("variable name")?;
        self.expect(&TokenKind::Semicolon, ";")?;
        Ok(StageVariable { name, ty, location: attrs.get("location").cloned(), condition: attrs.get("optional").cloned() })
    }

    fn parse_external_block(&mut self) -> Result<Statement, ParseError> {
        let mut variables = Vec::new();
        if matches!(self.peek(), TokenKind::LBrace) {
            self.advance();
            while !matches!(self.peek(), TokenKind::RBrace) {
                variables.push(self.parse_external_variable()?);
            }
            self.expect(&TokenKind::RBrace, "}")?;
        } else {
            variables.push(self.parse_external_variable()?);
        }
        Ok(Statement::ExternalDeclaration { variables })
    }

    fn parse_external_variable(&mut self) -> Result<ExternalVariable, ParseError> {
        let attrs = self.parse_attributes()?;
        let ty = self.parse_type()?;
        let name = self.expect_ident("variable name")?;
        self.expect(&TokenKind::Semicolon, ";")?;
        let layout = match attrs.get("layout").and_then(Self::attr_as_ident).as_deref() {
            Some("std140") => ExternalLayout::Std140,
            _ => ExternalLayout::Default,
        };
        Ok(ExternalVariable {
            name,
            ty,
            set: attrs.get("set").cloned(),
            binding: attrs.get("binding").cloned(),
            layout,
            condition: attrs.get("optional").cloned(),
        })
    }

    fn parse_option_block(&mut self) -> Result<Statement, ParseError> {
        let mut variables = Vec::new();
        if matches!(self.peek(), TokenKind::LBrace) {
            self.advance();
            while !matches!(self.peek(), TokenKind::RBrace) {
                variables.push(self.parse_option_variable()?);
            }
            self.expect(&TokenKind::RBrace, "}")?;
        } else {
            variables.push(self.parse_option_variable()?);
        }
        Ok(Statement::OptionDeclaration { variables })
    }

    fn parse_option_variable(&mut self) -> Result<OptionVariable, ParseError> {
        let ty = self.parse_type()?;
        let name = self.expect_ident("option name")?;
        let default_value = if matches!(self.peek(), TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semicolon, ";")?;
        Ok(OptionVariable { name, ty, default_value })
    }

    fn parse_struct_decl(&mut self) -> Result<Statement, ParseError> {
        let name = self.expect_ident("struct name")?;
        self.expect(&TokenKind::LBrace, "{")?;
        let mut members = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace) {
            let attrs = self.parse_attributes()?;
            let ty = self.parse_type()?;
            let member_name = self.expect_ident("member name")?;
            self.expect(&TokenKind::Semicolon, ";")?;
            members.push(StructMember { name: member_name, ty, condition: attrs.get("optional").cloned() });
        }
        self.expect(&TokenKind::RBrace, "}")?;
        Ok(Statement::StructDeclaration(StructDeclaration { name, members }))
    }

    fn parse_include(&mut self) -> Result<Statement, ParseError> {
        let mut names = vec![self.parse_dotted_library_name()?];
        while matches!(self.peek(), TokenKind::Comma) {
            self.advance();
            names.push(self.parse_dotted_library_name()?);
        }
        if matches!(self.peek(), TokenKind::Semicolon) {
            self.advance();
        }
        Ok(Statement::Include(names))
    }

    /// A library name is a dot-joined path, e.g. `Atema.GBufferWrite.Options`.
    fn parse_dotted_library_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.expect_ident("library name")?;
        while matches!(self.peek(), TokenKind::Dot) {
            self.advance();
            name.push('.');
            name.push_str(&self.expect_ident("library name segment")?);
        }
        Ok(name)
    }

    fn parse_conditional(&mut self) -> Result<Statement, ParseError> {
        let mut branches = Vec::new();
        self.expect_keyword_ident("if")?;
        self.expect(&TokenKind::LParen, "(")?;
        let mut condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, ")")?;
        let mut body = Box::new(self.parse_statement_or_block()?);
        branches.push(ConditionalBranch { condition: Some(condition), body });

        loop {
            if self.peek_keyword("else") {
                self.advance();
                if self.peek_keyword("if") {
                    self.advance();
                    self.expect(&TokenKind::LParen, "(")?;
                    condition = self.parse_expression()?;
                    self.expect(&TokenKind::RParen, ")")?;
                    body = Box::new(self.parse_statement_or_block()?);
                    branches.push(ConditionalBranch { condition: Some(condition.clone()), body });
                } else {
                    let else_body = Box::new(self.parse_statement_or_block()?);
                    branches.push(ConditionalBranch { condition: None, body: else_body });
                    break;
                }
            } else {
                break;
            }
        }
        Ok(Statement::Conditional(branches))
    }

    fn expect_keyword_ident(&mut self, word: &str) -> Result<(), ParseError> {
        if self.peek_keyword(word) {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken { location: self.location(), found: format!("{:?}", self.peek()), expected: word.to_string() })
        }
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword_ident("for")?;
        self.expect(&TokenKind::LParen, "(")?;
        let initialization = if matches!(self.peek(), TokenKind::Semicolon) {
            self.advance();
            None
        } else {
            let stmt = self.parse_statement()?; // consumes trailing ';'
            Some(Box::new(stmt))
        };
        let condition = if matches!(self.peek(), TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::Semicolon, ";")?;
        let increment = if matches!(self.peek(), TokenKind::RParen) {
            None
        } else {
            Some(Box::new(Statement::ExpressionStatement(self.parse_expression()?)))
        };
        self.expect(&TokenKind::RParen, ")")?;
        let body = Box::new(self.parse_statement_or_block()?);
        Ok(Statement::ForLoop(ForLoop { initialization, condition, increment, body }))
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword_ident("while")?;
        self.expect(&TokenKind::LParen, "(")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, ")")?;
        let body = Box::new(self.parse_statement_or_block()?);
        Ok(Statement::WhileLoop { condition, body })
    }

    fn parse_do_while(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword_ident("do")?;
        let body = Box::new(self.parse_statement_or_block()?);
        self.expect_keyword_ident("while")?;
        self.expect(&TokenKind::LParen, "(")?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen, ")")?;
        self.expect(&TokenKind::Semicolon, ";")?;
        Ok(Statement::DoWhileLoop { condition, body })
    }

    // --- expressions: precedence climbing --------------------------------

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expression, ParseError> {
        let lhs = self.parse_ternary()?;
        if matches!(self.peek(), TokenKind::Assign) {
            self.advance();
            let rhs = self.parse_assignment()?;
            return Ok(Expression::Assignment { lhs: Box::new(lhs), rhs: Box::new(rhs) });
        }
        Ok(lhs)
    }

    fn parse_ternary(&mut self) -> Result<Expression, ParseError> {
        let condition = self.parse_logical_or()?;
        if matches!(self.peek(), TokenKind::Question) {
            self.advance();
            let then_branch = self.parse_expression()?;
            self.expect(&TokenKind::Colon, ":")?;
            let else_branch = self.parse_assignment()?;
            return Ok(Expression::Ternary { condition: Box::new(condition), then_branch: Box::new(then_branch), else_branch: Box::new(else_branch) });
        }
        Ok(condition)
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_logical_and()?;
        while matches!(self.peek(), TokenKind::PipePipe) {
            self.advance();
            let rhs = self.parse_logical_and()?;
            lhs = Expression::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_bit_or()?;
        while matches!(self.peek(), TokenKind::AmpAmp) {
            self.advance();
            let rhs = self.parse_bit_or()?;
            lhs = Expression::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_bit_xor()?;
        while matches!(self.peek(), TokenKind::Pipe) {
            self.advance();
            let rhs = self.parse_bit_xor()?;
            lhs = Expression::Binary { op: BinaryOp::BitOr, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_bit_and()?;
        while matches!(self.peek(), TokenKind::Caret) {
            self.advance();
            let rhs = self.parse_bit_and()?;
            lhs = Expression::Binary { op: BinaryOp::BitXor, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.peek(), TokenKind::Amp) {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expression::Binary { op: BinaryOp::BitAnd, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Equal,
                TokenKind::Ne => BinaryOp::NotEqual,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinaryOp::Less,
                TokenKind::Gt => BinaryOp::Greater,
                TokenKind::Le => BinaryOp::LessEqual,
                TokenKind::Ge => BinaryOp::GreaterEqual,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::ShiftLeft => BinaryOp::ShiftLeft,
                TokenKind::ShiftRight => BinaryOp::ShiftRight,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Multiply,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Percent => BinaryOp::Modulo,
                TokenKind::StarStar => BinaryOp::Power,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expression::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        let op = match self.peek() {
            TokenKind::PlusPlus => Some(UnaryOp::PreIncrement),
            TokenKind::MinusMinus => Some(UnaryOp::PreDecrement),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::Unary { op, operand: Box::new(operand) });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident("member or swizzle")?;
                    if name.len() <= 4 && name.chars().all(|c| matches!(c, 'x' | 'y' | 'z' | 'w')) {
                        let components = name
                            .chars()
                            .map(|c| match c {
                                'x' => SwizzleComponent::X,
                                'y' => SwizzleComponent::Y,
                                'z' => SwizzleComponent::Z,
                                _ => SwizzleComponent::W,
                            })
                            .collect();
                        expr = Expression::Swizzle { base: Box::new(expr), components };
                    } else {
                        expr = Expression::AccessIdentifier { base: Box::new(expr), identifier: name };
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "]")?;
                    expr = Expression::AccessIndex { base: Box::new(expr), index: Box::new(index) };
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    expr = Expression::Unary { op: UnaryOp::PostIncrement, operand: Box::new(expr) };
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    expr = Expression::Unary { op: UnaryOp::PostDecrement, operand: Box::new(expr) };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expression>, ParseError> {
        self.expect(&TokenKind::LParen, "(")?;
        let mut args = Vec::new();
        while !matches!(self.peek(), TokenKind::RParen) {
            args.push(self.parse_expression()?);
            if matches!(self.peek(), TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(&TokenKind::RParen, ")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.peek().clone() {
            TokenKind::IntLiteral(v, is_unsigned) => {
                self.advance();
                Ok(Expression::Constant(if is_unsigned { ConstantValue::U32(v as u32) } else { ConstantValue::I32(v as i32) }))
            }
            TokenKind::FloatLiteral(v) => {
                self.advance();
                Ok(Expression::Constant(ConstantValue::F32(v as f32)))
            }
            TokenKind::BoolLiteral(b) => {
                self.advance();
                Ok(Expression::Constant(ConstantValue::Bool(b)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, ")")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                self.advance();
                if matches!(self.peek(), TokenKind::LParen) {
                    if let Some(ty) = primitive_type(&name) {
                        let args = self.parse_call_args()?;
                        return Ok(Expression::Cast { target: ty, args });
                    }
                    if known_builtin_name(&name) {
                        let args = self.parse_call_args()?;
                        return Ok(Expression::BuiltInFunctionCall { function: BuiltInFunction::from_name(&name), args });
                    }
                    let args = self.parse_call_args()?;
                    return Ok(Expression::FunctionCall { name, args });
                }
                Ok(Expression::Variable(name))
            }
            other => Err(ParseError::UnexpectedToken { location: self.location(), found: format!("{other:?}"), expected: "an expression".to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(src: &str) -> Expression {
        let tokens = tokenize(src).unwrap();
        let mut parser = Parser { tokens, pos: 0 };
        parser.parse_expression().unwrap()
    }

    #[test]
    fn parses_scaled_vector_expression() {
        let expr = parse_expr("(2 + 3) * vec2f(1.0, 2.0)");
        match expr {
            Expression::Binary { op: BinaryOp::Multiply, .. } => {}
            other => panic!("expected a multiply at the root, got {other:?}"),
        }
    }

    #[test]
    fn ternary_is_right_associative_with_assignment() {
        let expr = parse_expr("a ? b : c");
        assert!(matches!(expr, Expression::Ternary { .. }));
    }

    #[test]
    fn swizzle_vs_member_access() {
        let expr = parse_expr("v.xy");
        assert!(matches!(expr, Expression::Swizzle { .. }));
        let expr = parse_expr("v.radius");
        assert!(matches!(expr, Expression::AccessIdentifier { .. }));
    }

    #[test]
    fn parses_option_and_optional_block() {
        let program = parse("option { int N = 4; } optional(N > 2) { int x = N; }").unwrap();
        match program {
            Statement::Sequence(stmts) => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0], Statement::OptionDeclaration { .. }));
                assert!(matches!(stmts[1], Statement::Optional { .. }));
            }
            other => panic!("expected a root sequence, got {other:?}"),
        }
    }

    #[test]
    fn parses_entry_function_with_stage_attribute() {
        let program = parse("[entry(vertex)] void main() { return; }").unwrap();
        match program {
            Statement::Sequence(stmts) => {
                assert!(matches!(stmts[0], Statement::EntryFunctionDeclaration(ref e) if e.stage == "vertex"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_struct_with_optional_member() {
        let program = parse("struct Light { vec3f position; [optional(true)] float radius; }").unwrap();
        match program {
            Statement::Sequence(stmts) => match &stmts[0] {
                Statement::StructDeclaration(s) => {
                    assert_eq!(s.name, "Light");
                    assert_eq!(s.members.len(), 2);
                    assert!(s.members[1].condition.is_some());
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
