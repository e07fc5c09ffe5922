//! Equation text to term expressions
//!
//! ```text
//! equation := "d" FIELD "/dt" "=" sum
//! sum      := [sign] product (sign product)*
//! product  := factor (["*"] factor)*
//! factor   := "LAP" ["^" INT] | SYMBOL ["^" NUMBER] | NUMBER ["^" NUMBER]
//! ```
//!
//! Whitespace separates tokens and juxtaposed factors multiply, so
//! `LAP conc` and `LAP*conc` are the same term.

use std::fmt;

// =================================================================================================
// Expressions
// =================================================================================================

/// Symbol raised to a power inside a product
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub symbol: String,
    pub power: f64,
}

/// One signed product of the right-hand side
#[derive(Debug, Clone, PartialEq)]
pub struct TermExpr {
    /// `+1` or `-1`
    pub sign: f64,
    /// Product of all numeric literals of the term
    pub coefficient: f64,
    /// Accumulated power of the Laplacian prefix
    pub laplacian_power: i32,
    /// Symbols in order of appearance
    pub factors: Vec<Factor>,
}

impl TermExpr {
    /// Sign times numeric coefficient
    pub fn scale(&self) -> f64 {
        self.sign * self.coefficient
    }

    /// True if `symbol` appears among the factors
    pub fn mentions(&self, symbol: &str) -> bool {
        self.factors.iter().any(|f| f.symbol == symbol)
    }
}

impl fmt::Display for TermExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.sign < 0.0 { "-" } else { "+" })?;
        if self.laplacian_power != 0 {
            write!(f, "LAP^{} ", self.laplacian_power)?;
        }
        if self.coefficient != 1.0 || self.factors.is_empty() {
            write!(f, "{}", self.coefficient)?;
            if !self.factors.is_empty() {
                write!(f, "*")?;
            }
        }
        write!(f, "{}", canonical_name(&self.factors))
    }
}

/// Parsed equation
#[derive(Debug, Clone, PartialEq)]
pub struct Equation {
    /// Name of the evolved field
    pub field: String,
    pub terms: Vec<TermExpr>,
    /// Source text, kept for diagnostics
    pub text: String,
}

// =================================================================================================
// Entry Points
// =================================================================================================

/// Parse a full `d<field>/dt = ...` equation
///
/// # Errors
///
/// Returns an error for a missing `=`, a malformed time derivative, or a
/// malformed right-hand side.
pub fn parse_equation(text: &str) -> Result<Equation, String> {
    let mut sides = text.split('=');
    let (Some(lhs), Some(rhs), None) = (sides.next(), sides.next(), sides.next()) else {
        return Err(format!("Equation '{}' must contain exactly one '='", text));
    };

    let field = field_name_from_leibniz(lhs)?;
    let terms = parse_rhs(rhs).map_err(|e| format!("In equation '{}': {}", text.trim(), e))?;

    Ok(Equation {
        field,
        terms,
        text: text.trim().to_string(),
    })
}

/// Extract `field` from `dfield/dt`
///
/// ```rust
/// use spectral_pf::equation::field_name_from_leibniz;
///
/// assert_eq!(field_name_from_leibniz(" dconc/dt ").unwrap(), "conc");
/// assert!(field_name_from_leibniz("conc/dt").is_err());
/// assert!(field_name_from_leibniz("d/dt").is_err());
/// ```
pub fn field_name_from_leibniz(lhs: &str) -> Result<String, String> {
    let lhs = lhs.trim();
    let name = lhs
        .strip_prefix('d')
        .and_then(|rest| rest.strip_suffix("/dt"))
        .map(str::trim)
        .ok_or_else(|| format!("Left-hand side '{}' is not of the form d<field>/dt", lhs))?;

    if name.is_empty() {
        return Err(format!("Left-hand side '{}' names no field", lhs));
    }
    if !name.chars().all(is_symbol_char) {
        return Err(format!("'{}' is not a valid field name", name));
    }
    Ok(name.to_string())
}

/// Parse the right-hand side into signed products
pub fn parse_rhs(text: &str) -> Result<Vec<TermExpr>, String> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err("right-hand side is empty".to_string());
    }
    Parser { tokens, pos: 0 }.sum()
}

/// Canonical name of a product of symbols
///
/// Factors are sorted by symbol, repeated symbols have their powers summed
/// and a power of one is omitted:
///
/// ```rust
/// use spectral_pf::equation::{canonical_name, Factor};
///
/// let factors = vec![
///     Factor { symbol: "concB".into(), power: 3.0 },
///     Factor { symbol: "concA".into(), power: 2.0 },
/// ];
/// assert_eq!(canonical_name(&factors), "concA^2*concB^3");
/// ```
pub fn canonical_name(factors: &[Factor]) -> String {
    merge_factors(factors)
        .iter()
        .map(|f| {
            if f.power == 1.0 {
                f.symbol.clone()
            } else {
                format!("{}^{}", f.symbol, format_power(f.power))
            }
        })
        .collect::<Vec<_>>()
        .join("*")
}

/// Sort factors by symbol and sum the powers of repeated symbols
pub fn merge_factors(factors: &[Factor]) -> Vec<Factor> {
    let mut merged: Vec<Factor> = Vec::with_capacity(factors.len());
    let mut sorted = factors.to_vec();
    sorted.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    for factor in sorted {
        match merged.last_mut() {
            Some(last) if last.symbol == factor.symbol => last.power += factor.power,
            _ => merged.push(factor),
        }
    }
    merged
}

fn format_power(power: f64) -> String {
    if power.fract() == 0.0 && power.abs() < 1e15 {
        format!("{}", power as i64)
    } else {
        format!("{}", power)
    }
}

// =================================================================================================
// Tokenizer
// =================================================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Symbol(String),
    Number(f64),
    Caret,
    Star,
    Plus,
    Minus,
}

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent only when digits follow, so `2e` stays a number times symbol `e`
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("'{}' is not a valid number", literal))?;
                tokens.push(Token::Number(value));
            }
            c if is_symbol_char(c) => {
                let start = i;
                while i < chars.len() && is_symbol_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Symbol(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

// =================================================================================================
// Parser
// =================================================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn sum(&mut self) -> Result<Vec<TermExpr>, String> {
        let mut terms = Vec::new();
        loop {
            let mut sign = 1.0;
            let mut saw_sign = false;
            loop {
                match self.peek() {
                    Some(Token::Plus) => {}
                    Some(Token::Minus) => sign = -sign,
                    _ => break,
                }
                saw_sign = true;
                self.pos += 1;
            }

            if !terms.is_empty() && !saw_sign {
                return Err("terms must be separated by '+' or '-'".to_string());
            }

            terms.push(self.product(sign)?);

            if self.peek().is_none() {
                return Ok(terms);
            }
        }
    }

    fn product(&mut self, sign: f64) -> Result<TermExpr, String> {
        let mut term = TermExpr {
            sign,
            coefficient: 1.0,
            laplacian_power: 0,
            factors: Vec::new(),
        };

        self.factor(&mut term)?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    self.factor(&mut term)?;
                }
                Some(Token::Symbol(_) | Token::Number(_)) => self.factor(&mut term)?,
                _ => break,
            }
        }

        if term.factors.is_empty() && term.laplacian_power != 0 {
            return Err("LAP must be applied to a symbol".to_string());
        }
        Ok(term)
    }

    fn factor(&mut self, term: &mut TermExpr) -> Result<(), String> {
        match self.next() {
            Some(Token::Symbol(symbol)) if symbol == "LAP" => {
                let power = if self.peek() == Some(&Token::Caret) {
                    self.pos += 1;
                    let p = self.exponent()?;
                    if p.fract() != 0.0 || p < 1.0 {
                        return Err(format!("LAP power must be a positive integer, got {}", p));
                    }
                    p as i32
                } else {
                    1
                };
                term.laplacian_power += power;
                Ok(())
            }
            Some(Token::Symbol(symbol)) => {
                let power = if self.peek() == Some(&Token::Caret) {
                    self.pos += 1;
                    self.exponent()?
                } else {
                    1.0
                };
                term.factors.push(Factor { symbol, power });
                Ok(())
            }
            Some(Token::Number(value)) => {
                let value = if self.peek() == Some(&Token::Caret) {
                    self.pos += 1;
                    value.powf(self.exponent()?)
                } else {
                    value
                };
                term.coefficient *= value;
                Ok(())
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("expression ends where a factor was expected".to_string()),
        }
    }

    fn exponent(&mut self) -> Result<f64, String> {
        let negative = if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            true
        } else {
            false
        };
        match self.next() {
            Some(Token::Number(value)) => Ok(if negative { -value } else { value }),
            _ => Err("'^' must be followed by a number".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(symbol: &str, power: f64) -> Factor {
        Factor {
            symbol: symbol.to_string(),
            power,
        }
    }

    #[test]
    fn test_leibniz_notation() {
        assert_eq!(field_name_from_leibniz("dconc/dt").unwrap(), "conc");
        assert_eq!(field_name_from_leibniz("  dconcA/dt").unwrap(), "concA");
        assert_eq!(field_name_from_leibniz("ddelta/dt").unwrap(), "delta");

        assert!(field_name_from_leibniz("conc/dt").is_err());
        assert!(field_name_from_leibniz("dconc/dx").is_err());
        assert!(field_name_from_leibniz("d/dt").is_err());
        assert!(field_name_from_leibniz("dc*d/dt").is_err());
    }

    #[test]
    fn test_equation_requires_single_equals() {
        assert!(parse_equation("dconc/dt LAP conc").is_err());
        assert!(parse_equation("dconc/dt = conc = 2").is_err());
        assert!(parse_equation("dconc/dt = ").is_err());
    }

    #[test]
    fn test_reaction_diffusion_equation() {
        let eq = parse_equation("dconcA/dt = LAP concA - kf*concA^2*concB^3 + kr*concC").unwrap();
        assert_eq!(eq.field, "concA");
        assert_eq!(eq.terms.len(), 3);

        assert_eq!(eq.terms[0].sign, 1.0);
        assert_eq!(eq.terms[0].laplacian_power, 1);
        assert_eq!(eq.terms[0].factors, vec![factor("concA", 1.0)]);

        assert_eq!(eq.terms[1].sign, -1.0);
        assert_eq!(
            eq.terms[1].factors,
            vec![factor("kf", 1.0), factor("concA", 2.0), factor("concB", 3.0)]
        );

        assert_eq!(eq.terms[2].sign, 1.0);
        assert_eq!(eq.terms[2].factors, vec![factor("kr", 1.0), factor("concC", 1.0)]);
    }

    #[test]
    fn test_leading_sign_and_laplacian_powers() {
        let terms = parse_rhs("-LAP^2 eta + LAP LAP conc").unwrap();
        assert_eq!(terms[0].sign, -1.0);
        assert_eq!(terms[0].laplacian_power, 2);
        assert_eq!(terms[1].laplacian_power, 2);
        assert_eq!(terms[1].factors, vec![factor("conc", 1.0)]);
    }

    #[test]
    fn test_numeric_coefficients_and_powers() {
        let terms = parse_rhs("2*c - 0.5 P*current^-2 + 2^3 x^1.62").unwrap();
        assert_eq!(terms[0].coefficient, 2.0);
        assert_eq!(terms[0].factors, vec![factor("c", 1.0)]);

        assert_eq!(terms[1].scale(), -0.5);
        assert_eq!(terms[1].factors, vec![factor("P", 1.0), factor("current", -2.0)]);

        assert_eq!(terms[2].coefficient, 8.0);
        assert_eq!(terms[2].factors, vec![factor("x", 1.62)]);
    }

    #[test]
    fn test_scientific_literal() {
        let terms = parse_rhs("1e-3*conc + 2.5E2").unwrap();
        assert_eq!(terms[0].coefficient, 1e-3);
        assert_eq!(terms[1].coefficient, 250.0);
        assert!(terms[1].factors.is_empty());
    }

    #[test]
    fn test_malformed_rhs() {
        assert!(parse_rhs("a ** b").is_err());
        assert!(parse_rhs("a^").is_err());
        assert!(parse_rhs("a +").is_err());
        assert!(parse_rhs("LAP").is_err());
        assert!(parse_rhs("LAP^0.5 c").is_err());
        assert!(parse_rhs("c / 2").is_err());
    }

    #[test]
    fn test_canonical_name_merges_and_sorts() {
        let factors = vec![factor("b", 1.0), factor("a", 2.0), factor("b", 2.0)];
        assert_eq!(canonical_name(&factors), "a^2*b^3");

        let single = vec![factor("conc", 1.0)];
        assert_eq!(canonical_name(&single), "conc");

        let fractional = vec![factor("x", 1.5), factor("y", -1.0)];
        assert_eq!(canonical_name(&fractional), "x^1.5*y^-1");
    }
}
