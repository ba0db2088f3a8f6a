use std::fmt;

/// A kou type. Equality is structural: two types are equal iff their tags and
/// all component types are pairwise equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Str,
    Bool,
    Char,
    Void,
    Array(Box<Type>),
    Tuple(Vec<Type>),
    Func(Vec<Type>, Box<Type>),
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Types that can be compared with `==`.
    pub fn is_equatable(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Bool | Type::Char)
    }

    /// Whether a function type appears anywhere inside this type.
    pub fn contains_func(&self) -> bool {
        match self {
            Type::Func(..) => true,
            Type::Array(elem) => elem.contains_func(),
            Type::Tuple(fields) => fields.iter().any(Type::contains_func),
            _ => false,
        }
    }

    pub fn array_of(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    pub fn func(params: impl IntoIterator<Item = Type>, ret: Type) -> Type {
        Type::Func(params.into_iter().collect(), Box::new(ret))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Str => f.write_str("str"),
            Type::Bool => f.write_str("bool"),
            Type::Char => f.write_str("char"),
            Type::Void => f.write_str("void"),
            Type::Array(elem) => write!(f, "[{elem}]"),
            Type::Tuple(fields) => {
                f.write_str("(")?;
                write_list(f, fields)?;
                f.write_str(")")
            }
            Type::Func(params, ret) => {
                f.write_str("fn (")?;
                write_list(f, params)?;
                write!(f, ") {ret}")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}
