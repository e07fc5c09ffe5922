//! Term classification and compilation
//!
//! Each parsed term is routed to one side of the right-hand side:
//!
//! - **Implicit**: the evolved field appears exactly once, to the first
//!   power, and every other symbol is a scalar. The term is linear in the
//!   field, so its coefficient goes to `denum`.
//! - **Explicit**: anything else. The field-like part of the product is
//!   looked up as a single brick (a field, or a derived field holding the
//!   monomial) and the scalar part becomes a per-node prefactor.
//!
//! Terms that reference a registered user term by name contribute that
//! term's closure instead.

use std::sync::Arc;

use num_complex::Complex64;

use super::operators::{apply_laplacian, complex_pow};
use super::parser::{canonical_name, merge_factors, Equation, Factor, TermExpr};
use crate::physics::{BrickId, Bricks, DerivedFieldCalc, EvalContext, Rhs, Term, UserTerm, UserTerms};

/// Side of the right-hand side a term contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermClass {
    Implicit,
    Explicit,
}

/// Decide whether `term` is linear in `field` with scalar coefficients
///
/// Symbols that are not registered yet count as scalars, so a term can be
/// re-classified once every brick is known.
pub fn classify(term: &TermExpr, field: &str, bricks: &Bricks) -> TermClass {
    let occurrences: Vec<&Factor> = term.factors.iter().filter(|f| f.symbol == field).collect();
    if occurrences.len() != 1 || (occurrences[0].power - 1.0).abs() > 1e-12 {
        return TermClass::Explicit;
    }

    let others_are_scalars = term
        .factors
        .iter()
        .filter(|f| f.symbol != field)
        .all(|f| !bricks.is_field_like(&f.symbol));

    if others_are_scalars {
        TermClass::Implicit
    } else {
        TermClass::Explicit
    }
}

/// Monomials of `equation` that need a derived field of their own
///
/// Returns `(canonical name, factors)` for every explicit term whose
/// field-like part is more than a single symbol to the first power and
/// whose canonical name is not registered yet. Duplicates are reported
/// once.
pub(crate) fn missing_monomials(
    equation: &Equation,
    bricks: &Bricks,
    user_terms: &UserTerms,
) -> Vec<(String, Vec<Factor>)> {
    let mut missing: Vec<(String, Vec<Factor>)> = Vec::new();

    for term in &equation.terms {
        if references_user_term(term, user_terms).is_some() {
            continue;
        }
        if classify(term, &equation.field, bricks) == TermClass::Implicit {
            continue;
        }

        let monomial = field_like_part(term, bricks);
        if is_direct_reference(&monomial) || monomial.is_empty() {
            continue;
        }

        let name = canonical_name(&monomial);
        if !bricks.contains(&name) && !missing.iter().any(|(n, _)| *n == name) {
            missing.push((name, monomial));
        }
    }

    missing
}

/// Compile every term of `equation` into closures
///
/// # Errors
///
/// Returns an error if a symbol is not registered, a user term is combined
/// with other factors, or a user term fails to construct.
pub(crate) fn compile_equation(
    equation: &Equation,
    bricks: &Bricks,
    user_terms: &mut UserTerms,
) -> Result<Rhs, String> {
    let mut rhs = Rhs::new();

    for term in &equation.terms {
        if let Some(name) = references_user_term(term, user_terms) {
            compile_user_term(term, &name, bricks, user_terms, &mut rhs)
                .map_err(|e| format!("In equation '{}': {}", equation.text, e))?;
            continue;
        }

        let compiled = match classify(term, &equation.field, bricks) {
            TermClass::Implicit => compile_implicit(term, &equation.field, bricks).map(|t| (t, TermClass::Implicit)),
            TermClass::Explicit => compile_explicit(term, bricks).map(|t| (t, TermClass::Explicit)),
        }
        .map_err(|e| format!("In equation '{}': {}", equation.text, e))?;

        match compiled {
            (term, TermClass::Implicit) => rhs.denum.push(term),
            (term, TermClass::Explicit) => rhs.terms.push(term),
        }
    }

    Ok(rhs)
}

// =================================================================================================
// Helpers
// =================================================================================================

fn references_user_term(term: &TermExpr, user_terms: &UserTerms) -> Option<String> {
    term.factors
        .iter()
        .find(|f| user_terms.contains(&f.symbol))
        .map(|f| f.symbol.clone())
}

fn field_like_part(term: &TermExpr, bricks: &Bricks) -> Vec<Factor> {
    let field_like: Vec<Factor> = term
        .factors
        .iter()
        .filter(|f| bricks.is_field_like(&f.symbol))
        .cloned()
        .collect();
    merge_factors(&field_like)
}

fn is_direct_reference(monomial: &[Factor]) -> bool {
    monomial.len() == 1 && monomial[0].power == 1.0
}

fn resolve(symbol: &str, bricks: &Bricks) -> Result<BrickId, String> {
    bricks
        .id(symbol)
        .ok_or_else(|| format!("symbol '{}' is not defined", symbol))
}

fn resolve_coefficients<'a, I>(factors: I, bricks: &Bricks) -> Result<Vec<(BrickId, f64)>, String>
where
    I: Iterator<Item = &'a Factor>,
{
    factors.map(|f| Ok((resolve(&f.symbol, bricks)?, f.power))).collect()
}

fn compile_implicit(term: &TermExpr, field: &str, bricks: &Bricks) -> Result<Term, String> {
    let coefficients = resolve_coefficients(term.factors.iter().filter(|f| f.symbol != field), bricks)?;
    Ok(product_term(term.scale(), coefficients, None, term.laplacian_power))
}

fn compile_explicit(term: &TermExpr, bricks: &Bricks) -> Result<Term, String> {
    let coefficients = resolve_coefficients(
        term.factors.iter().filter(|f| !bricks.is_field_like(&f.symbol)),
        bricks,
    )?;

    let monomial = field_like_part(term, bricks);
    if monomial.is_empty() {
        return Ok(constant_term(term.scale(), coefficients, term.laplacian_power));
    }

    let source = if is_direct_reference(&monomial) {
        resolve(&monomial[0].symbol, bricks)?
    } else {
        let name = canonical_name(&monomial);
        bricks
            .id(&name)
            .ok_or_else(|| format!("derived field '{}' has not been registered", name))?
    };

    Ok(product_term(term.scale(), coefficients, Some(source), term.laplacian_power))
}

fn compile_user_term(
    term: &TermExpr,
    name: &str,
    bricks: &Bricks,
    user_terms: &mut UserTerms,
    rhs: &mut Rhs,
) -> Result<(), String> {
    if term.factors.len() != 1 || term.factors[0].power != 1.0 {
        return Err(format!("user term '{}' cannot be combined with other symbols", name));
    }

    let scale = term.scale();
    let laplacian = term.laplacian_power;
    let Some(user_term) = user_terms.get_mut(name) else {
        return Err(format!("user term '{}' is not registered", name));
    };

    match user_term {
        UserTerm::Explicit(pure) => rhs.terms.push(scaled(pure.construct(bricks)?, scale, laplacian)),
        UserTerm::Implicit(pure) => rhs.denum.push(scaled(pure.construct(bricks)?, scale, laplacian)),
        UserTerm::Mixed(mixed) => {
            rhs.denum.push(scaled(mixed.construct_linear(bricks)?, scale, laplacian));
            rhs.terms.push(scaled(mixed.construct_nonlinear(bricks)?, scale, laplacian));
        }
    }
    Ok(())
}

// =================================================================================================
// Term Closures
// =================================================================================================

/// `scale * Π coefficient^p [* source]`, then the Laplacian
fn product_term(scale: f64, coefficients: Vec<(BrickId, f64)>, source: Option<BrickId>, laplacian: i32) -> Term {
    Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
        for (i, value) in out.iter_mut().enumerate() {
            let mut product = Complex64::new(scale, 0.0);
            for &(id, power) in &coefficients {
                product *= complex_pow(ctx.bricks.by_id(id).get(i), power);
            }
            if let Some(id) = source {
                product *= ctx.bricks.by_id(id).get(i);
            }
            *value = product;
        }
        apply_laplacian(laplacian, ctx.freq, out);
    })
}

/// Spatially constant source
///
/// A constant `c` in real space transforms to `c * N` at the zero-frequency
/// node and zero elsewhere.
fn constant_term(scale: f64, coefficients: Vec<(BrickId, f64)>, laplacian: i32) -> Term {
    Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
        let nodes = out.len() as f64;
        for (i, value) in out.iter_mut().enumerate() {
            *value = if ctx.freq.freq_norm_sq(i) == 0.0 {
                let mut product = Complex64::new(scale * nodes, 0.0);
                for &(id, power) in &coefficients {
                    product *= complex_pow(ctx.bricks.by_id(id).get(i), power);
                }
                product
            } else {
                Complex64::new(0.0, 0.0)
            };
        }
        apply_laplacian(laplacian, ctx.freq, out);
    })
}

/// Real-space recomputation of a monomial `Π field^p`
pub(crate) fn monomial_calc(factors: Vec<(BrickId, f64)>) -> DerivedFieldCalc {
    Box::new(move |bricks: &Bricks, out: &mut [Complex64]| {
        for (i, value) in out.iter_mut().enumerate() {
            let mut product = Complex64::new(1.0, 0.0);
            for &(id, power) in &factors {
                product *= complex_pow(bricks.by_id(id).get(i), power);
            }
            *value = product;
        }
    })
}

fn scaled(inner: Term, scale: f64, laplacian: i32) -> Term {
    if scale == 1.0 && laplacian == 0 {
        return inner;
    }
    Arc::new(move |ctx: &EvalContext<'_>, out: &mut [Complex64]| {
        inner(ctx, out);
        if scale != 1.0 {
            out.iter_mut().for_each(|v| *v *= scale);
        }
        apply_laplacian(laplacian, ctx.freq, out);
    })
}
