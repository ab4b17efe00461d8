//! Abstract syntax tree for the shader language: two disjoint node families,
//! [`Expression`] (value-producing) and [`Statement`] (effect-producing), plus
//! the [`Type`] sum used to annotate declarations and casts.
//!
//! Every node owns its children outright (`Box`/`Vec`), so the tree can never
//! cycle and a plain `#[derive(Clone)]` gives the explicit deep-clone the
//! preprocessor relies on: it builds new subtrees rather than mutating shared
//! ones.

use std::fmt;

/// A scalar or vector primitive component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    I32,
    U32,
    F32,
}

/// Texture sampler dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerDimension {
    D1,
    D2,
    D3,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerType {
    pub dimension: SamplerDimension,
    pub component: PrimitiveType,
}

/// Array length: fixed by a literal, fixed by an option's value, or left to
/// the back-end to infer from an initializer.
#[derive(Debug, Clone, PartialEq)]
pub enum ArraySizeKind {
    Implicit,
    Constant(u32),
    Option(String),
}

/// The type sum: `{Void, Primitive, Vector, Matrix, Sampler, Struct(name), Array}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Primitive(PrimitiveType),
    Vector { component: PrimitiveType, size: u8 },
    Matrix { component: PrimitiveType, cols: u8, rows: u8 },
    Sampler(SamplerType),
    Struct(String),
    Array { component: Box<Type>, size: ArraySizeKind },
}

impl Type {
    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }
}

/// A typed literal. The value set is `{bool, i32, u32, f32, vec2/3/4 of {i,u,f}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    Vec2I([i32; 2]),
    Vec3I([i32; 3]),
    Vec4I([i32; 4]),
    Vec2U([u32; 2]),
    Vec3U([u32; 3]),
    Vec4U([u32; 4]),
    Vec2F([f32; 2]),
    Vec3F([f32; 3]),
    Vec4F([f32; 4]),
}

impl ConstantValue {
    /// The static [`Type`] of this value.
    pub fn ty(&self) -> Type {
        use ConstantValue::*;
        match self {
            Bool(_) => Type::Primitive(PrimitiveType::Bool),
            I32(_) => Type::Primitive(PrimitiveType::I32),
            U32(_) => Type::Primitive(PrimitiveType::U32),
            F32(_) => Type::Primitive(PrimitiveType::F32),
            Vec2I(_) => Type::Vector { component: PrimitiveType::I32, size: 2 },
            Vec3I(_) => Type::Vector { component: PrimitiveType::I32, size: 3 },
            Vec4I(_) => Type::Vector { component: PrimitiveType::I32, size: 4 },
            Vec2U(_) => Type::Vector { component: PrimitiveType::U32, size: 2 },
            Vec3U(_) => Type::Vector { component: PrimitiveType::U32, size: 3 },
            Vec4U(_) => Type::Vector { component: PrimitiveType::U32, size: 4 },
            Vec2F(_) => Type::Vector { component: PrimitiveType::F32, size: 2 },
            Vec3F(_) => Type::Vector { component: PrimitiveType::F32, size: 3 },
            Vec4F(_) => Type::Vector { component: PrimitiveType::F32, size: 4 },
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, ConstantValue::Bool(_))
    }

    /// Number of vector components, or 1 for a scalar.
    pub fn component_count(&self) -> usize {
        use ConstantValue::*;
        match self {
            Bool(_) | I32(_) | U32(_) | F32(_) => 1,
            Vec2I(_) | Vec2U(_) | Vec2F(_) => 2,
            Vec3I(_) | Vec3U(_) | Vec3F(_) => 3,
            Vec4I(_) | Vec4U(_) | Vec4F(_) => 4,
        }
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConstantValue::*;
        match self {
            Bool(b) => write!(f, "{b}"),
            I32(v) => write!(f, "{v}"),
            U32(v) => write!(f, "{v}u"),
            F32(v) => write!(f, "{v:?}"),
            Vec2I([x, y]) => write!(f, "ivec2({x}, {y})"),
            Vec3I([x, y, z]) => write!(f, "ivec3({x}, {y}, {z})"),
            Vec4I([x, y, z, w]) => write!(f, "ivec4({x}, {y}, {z}, {w})"),
            Vec2U([x, y]) => write!(f, "uvec2({x}, {y})"),
            Vec3U([x, y, z]) => write!(f, "uvec3({x}, {y}, {z})"),
            Vec4U([x, y, z, w]) => write!(f, "uvec4({x}, {y}, {z}, {w})"),
            Vec2F([x, y]) => write!(f, "vec2({x:?}, {y:?})"),
            Vec3F([x, y, z]) => write!(f, "vec3({x:?}, {y:?}, {z:?})"),
            Vec4F([x, y, z, w]) => write!(f, "vec4({x:?}, {y:?}, {z:?}, {w:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwizzleComponent {
    X,
    Y,
    Z,
    W,
}

impl SwizzleComponent {
    pub fn index(self) -> usize {
        match self {
            SwizzleComponent::X => 0,
            SwizzleComponent::Y => 1,
            SwizzleComponent::Z => 2,
            SwizzleComponent::W => 3,
        }
    }

    pub fn letter(self) -> char {
        match self {
            SwizzleComponent::X => 'x',
            SwizzleComponent::Y => 'y',
            SwizzleComponent::Z => 'z',
            SwizzleComponent::W => 'w',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
    Plus,
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Modulo,
    BitXor,
    BitAnd,
    BitOr,
    And,
    Or,
    ShiftLeft,
    ShiftRight,
    Less,
    Greater,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Less | Greater | Equal | NotEqual | LessEqual | GreaterEqual)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// The fixed set of built-in functions the language recognizes by name.
/// `Other` covers any identifier matching a reserved built-in prefix that
/// this enumeration does not explicitly model, so the parser never has to
/// reject an otherwise well-formed program for lacking a variant here.
#[derive(Debug, Clone, PartialEq)]
pub enum BuiltInFunction {
    Min,
    Max,
    Clamp,
    Abs,
    Cross,
    Dot,
    Normalize,
    Length,
    Distance,
    Reflect,
    Pow,
    Sqrt,
    Floor,
    Ceil,
    Mix,
    Sample,
    SetVertexPosition,
    Other(String),
}

impl BuiltInFunction {
    pub fn name(&self) -> &str {
        use BuiltInFunction::*;
        match self {
            Min => "min",
            Max => "max",
            Clamp => "clamp",
            Abs => "abs",
            Cross => "cross",
            Dot => "dot",
            Normalize => "normalize",
            Length => "length",
            Distance => "distance",
            Reflect => "reflect",
            Pow => "pow",
            Sqrt => "sqrt",
            Floor => "floor",
            Ceil => "ceil",
            Mix => "mix",
            Sample => "sample",
            SetVertexPosition => "set_vertex_position",
            Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> BuiltInFunction {
        use BuiltInFunction::*;
        match name {
            "min" => Min,
            "max" => Max,
            "clamp" => Clamp,
            "abs" => Abs,
            "cross" => Cross,
            "dot" => Dot,
            "normalize" => Normalize,
            "length" => Length,
            "distance" => Distance,
            "reflect" => Reflect,
            "pow" => Pow,
            "sqrt" => Sqrt,
            "floor" => Floor,
            "ceil" => Ceil,
            "mix" => Mix,
            "sample" => Sample,
            "set_vertex_position" => SetVertexPosition,
            other => Other(other.to_string()),
        }
    }
}

/// Value-producing nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(ConstantValue),
    Variable(String),
    AccessIndex { base: Box<Expression>, index: Box<Expression> },
    AccessIdentifier { base: Box<Expression>, identifier: String },
    Swizzle { base: Box<Expression>, components: Vec<SwizzleComponent> },
    Assignment { lhs: Box<Expression>, rhs: Box<Expression> },
    Unary { op: UnaryOp, operand: Box<Expression> },
    Binary { op: BinaryOp, lhs: Box<Expression>, rhs: Box<Expression> },
    FunctionCall { name: String, args: Vec<Expression> },
    BuiltInFunctionCall { function: BuiltInFunction, args: Vec<Expression> },
    Cast { target: Type, args: Vec<Expression> },
    Ternary { condition: Box<Expression>, then_branch: Box<Expression>, else_branch: Box<Expression> },
}

impl Expression {
    /// True for nodes that may legally appear on the left of an [`Expression::Assignment`].
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            Expression::Variable(_)
                | Expression::AccessIndex { .. }
                | Expression::AccessIdentifier { .. }
                | Expression::Swizzle { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    /// `None` marks the trailing `else` branch.
    pub condition: Option<Expression>,
    pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub initialization: Option<Box<Statement>>,
    pub condition: Option<Expression>,
    pub increment: Option<Box<Statement>>,
    pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub name: String,
    pub ty: Type,
    pub is_const: bool,
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDeclaration {
    pub name: String,
    pub members: Vec<StructMember>,
}

/// A stage-scoped input or output variable.
#[derive(Debug, Clone, PartialEq)]
pub struct StageVariable {
    pub name: String,
    pub ty: Type,
    pub location: Option<Expression>,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalLayout {
    Default,
    Std140,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalVariable {
    pub name: String,
    pub ty: Type,
    pub set: Option<Expression>,
    pub binding: Option<Expression>,
    pub layout: ExternalLayout,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionVariable {
    pub name: String,
    pub ty: Type,
    pub default_value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub return_type: Type,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryFunctionDeclaration {
    pub stage: String,
    pub body: Vec<Statement>,
}

/// Effect-producing nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Conditional(Vec<ConditionalBranch>),
    ForLoop(ForLoop),
    WhileLoop { condition: Expression, body: Box<Statement> },
    DoWhileLoop { condition: Expression, body: Box<Statement> },
    VariableDeclaration(VariableDeclaration),
    StructDeclaration(StructDeclaration),
    InputDeclaration { stage: Option<String>, variables: Vec<StageVariable> },
    OutputDeclaration { stage: Option<String>, variables: Vec<StageVariable> },
    ExternalDeclaration { variables: Vec<ExternalVariable> },
    OptionDeclaration { variables: Vec<OptionVariable> },
    FunctionDeclaration(FunctionDeclaration),
    EntryFunctionDeclaration(EntryFunctionDeclaration),
    ExpressionStatement(Expression),
    Break,
    Continue,
    Return(Option<Expression>),
    Discard,
    Sequence(Vec<Statement>),
    Optional { condition: Expression, body: Box<Statement> },
    Include(Vec<String>),
}

impl Statement {
    /// The declaration name, for declarations that carry a single name
    /// (functions, structs, entry points). Variable blocks carry several
    /// names and are not represented here.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Statement::FunctionDeclaration(f) => Some(&f.name),
            Statement::StructDeclaration(s) => Some(&s.name),
            Statement::EntryFunctionDeclaration(e) => Some(&e.stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_component_count() {
        assert_eq!(ConstantValue::F32(1.0).component_count(), 1);
        assert_eq!(ConstantValue::Vec3F([1.0, 2.0, 3.0]).component_count(), 3);
    }

    #[test]
    fn builtin_round_trips_through_name() {
        assert_eq!(BuiltInFunction::from_name("dot").name(), "dot");
        assert_eq!(BuiltInFunction::from_name("foo").name(), "foo");
    }

    #[test]
    fn lvalue_classification() {
        assert!(Expression::Variable("x".into()).is_lvalue());
        assert!(!Expression::Constant(ConstantValue::I32(1)).is_lvalue());
    }
}
