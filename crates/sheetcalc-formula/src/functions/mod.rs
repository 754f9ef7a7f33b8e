//! Built-in spreadsheet functions

pub mod logical;
pub mod math;
pub mod statistical;

use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::FormulaValue;
use ahash::AHashMap;

/// Function implementation signature
///
/// Arguments arrive evaluated; a range argument is a [`FormulaValue::List`].
pub type FunctionImpl = fn(&[FormulaValue]) -> FormulaResult<FormulaValue>;

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
}

impl FunctionDef {
    /// Check a call's argument count against this definition
    pub fn check_arity(&self, actual: usize) -> FormulaResult<()> {
        if actual < self.min_args {
            return Err(FormulaError::ArgumentCount {
                function: self.name.to_string(),
                expected: format!("at least {}", self.min_args),
                actual,
            });
        }

        if let Some(max) = self.max_args {
            if actual > max {
                return Err(FormulaError::ArgumentCount {
                    function: self.name.to_string(),
                    expected: format!("at most {}", max),
                    actual,
                });
            }
        }

        Ok(())
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_statistical_functions();

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    /// Names of all registered functions, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.functions.values().map(|f| f.name).collect();
        names.sort_unstable();
        names
    }

    fn register_math_functions(&mut self) {
        // Aggregates take any number of arguments
        for (name, implementation) in [
            ("SUM", math::fn_sum as FunctionImpl),
            ("AVERAGE", math::fn_average),
            ("MIN", math::fn_min),
            ("MAX", math::fn_max),
            ("COUNT", math::fn_count),
        ] {
            self.register(FunctionDef {
                name,
                min_args: 1,
                max_args: None,
                implementation,
            });
        }

        self.register(FunctionDef {
            name: "ABS",
            min_args: 1,
            max_args: Some(1),
            implementation: math::fn_abs,
        });

        self.register(FunctionDef {
            name: "ROUND",
            min_args: 1,
            max_args: Some(2),
            implementation: math::fn_round,
        });
    }

    fn register_logical_functions(&mut self) {
        self.register(FunctionDef {
            name: "IF",
            min_args: 2,
            max_args: Some(3),
            implementation: logical::fn_if,
        });
    }

    fn register_statistical_functions(&mut self) {
        self.register(FunctionDef {
            name: "COUNTA",
            min_args: 1,
            max_args: None,
            implementation: statistical::fn_counta,
        });
    }
}

/// Every number among the arguments, with ranges flattened
///
/// Text and booleans passed directly are not numbers and are skipped, the
/// same as non-numeric range members.
pub(crate) fn numeric_args(args: &[FormulaValue]) -> impl Iterator<Item = f64> + '_ {
    args.iter().flat_map(|arg| match arg {
        FormulaValue::Number(n) => vec![*n],
        FormulaValue::List(items) => items.clone(),
        FormulaValue::String(_) | FormulaValue::Boolean(_) => Vec::new(),
    })
}

/// A single scalar argument as a number
pub(crate) fn scalar_arg(args: &[FormulaValue], index: usize, function: &str) -> FormulaResult<f64> {
    match args.get(index) {
        Some(FormulaValue::List(_)) => Err(FormulaError::TypeMismatch(format!(
            "{} expects a single value, got a range",
            function
        ))),
        Some(value) => value.to_number(),
        None => Ok(0.0),
    }
}
