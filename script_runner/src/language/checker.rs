//! Static capability check run after parsing.
//!
//! A program that passes here can only call whitelisted built-ins, never
//! names anything starting with an underscore, and never rebinds the inputs
//! it was handed.

use super::LanguageError;
use super::ast::*;
use super::builtins;

/// Bindings the host provides that scripts may read but not replace.
pub const READ_ONLY: &[&str] = &["student_answers", "question_id", "answer"];

pub fn check(program: &Program) -> Result<(), LanguageError> {
    program.body.iter().try_for_each(check_stmt)
}

fn capability(message: String, position: Position) -> LanguageError {
    LanguageError::Capability { message, position }
}

fn check_name(name: &str, pos: Position) -> Result<(), LanguageError> {
    if name.starts_with('_') {
        return Err(capability(
            format!("names starting with '_' are reserved: '{name}'"),
            pos,
        ));
    }
    Ok(())
}

fn check_binding(name: &str, pos: Position) -> Result<(), LanguageError> {
    check_name(name, pos)?;
    if READ_ONLY.contains(&name) {
        return Err(capability(format!("'{name}' is read-only"), pos));
    }
    Ok(())
}

fn check_block(body: &[Stmt]) -> Result<(), LanguageError> {
    body.iter().try_for_each(check_stmt)
}

fn check_stmt(stmt: &Stmt) -> Result<(), LanguageError> {
    match &stmt.kind {
        StmtKind::Assign { target, value } | StmtKind::AugAssign { target, value, .. } => {
            check_binding(&target.name, stmt.pos)?;
            target.indices.iter().try_for_each(check_expr)?;
            check_expr(value)
        }
        StmtKind::If {
            branches,
            otherwise,
        } => {
            for (cond, body) in branches {
                check_expr(cond)?;
                check_block(body)?;
            }
            match otherwise {
                Some(body) => check_block(body),
                None => Ok(()),
            }
        }
        StmtKind::While { cond, body } => {
            check_expr(cond)?;
            check_block(body)
        }
        StmtKind::For { vars, iter, body } => {
            for var in vars {
                check_binding(var, stmt.pos)?;
            }
            check_expr(iter)?;
            check_block(body)
        }
        StmtKind::Expr(expr) => {
            if let ExprKind::Call { name, args } = &expr.kind {
                if builtins::MUTATING.contains(&name.as_str()) {
                    if let Some(Expr {
                        kind: ExprKind::Name(receiver),
                        pos,
                    }) = args.first()
                    {
                        check_binding(receiver, *pos)?;
                    }
                }
            }
            check_expr(expr)
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Pass => Ok(()),
    }
}

fn check_expr(expr: &Expr) -> Result<(), LanguageError> {
    match &expr.kind {
        ExprKind::Literal(_) => Ok(()),
        ExprKind::Name(name) => check_name(name, expr.pos),
        ExprKind::List(items) => items.iter().try_for_each(check_expr),
        ExprKind::Map(entries) => entries.iter().try_for_each(|(k, v)| {
            check_expr(k)?;
            check_expr(v)
        }),
        ExprKind::Unary { operand, .. } => check_expr(operand),
        ExprKind::Binary { left, right, .. }
        | ExprKind::And(left, right)
        | ExprKind::Or(left, right) => {
            check_expr(left)?;
            check_expr(right)
        }
        ExprKind::Compare { first, rest } => {
            check_expr(first)?;
            rest.iter().try_for_each(|(_, e)| check_expr(e))
        }
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            check_expr(cond)?;
            check_expr(then)?;
            check_expr(otherwise)
        }
        ExprKind::Call { name, args } => {
            check_name(name, expr.pos)?;
            if !builtins::is_builtin(name) {
                return Err(capability(
                    format!("'{name}' is not an available function"),
                    expr.pos,
                ));
            }
            args.iter().try_for_each(check_expr)
        }
        ExprKind::Index { base, index } => {
            check_expr(base)?;
            check_expr(index)
        }
        ExprKind::Slice { base, start, end } => {
            check_expr(base)?;
            if let Some(start) = start {
                check_expr(start)?;
            }
            if let Some(end) = end {
                check_expr(end)?;
            }
            Ok(())
        }
        ExprKind::Comprehension {
            element,
            vars,
            iter,
            filter,
        } => {
            for var in vars {
                check_binding(var, expr.pos)?;
            }
            check_expr(iter)?;
            check_expr(element)?;
            match filter {
                Some(filter) => check_expr(filter),
                None => Ok(()),
            }
        }
    }
}
