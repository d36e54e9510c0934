//=====================================================
// File: ast/printer.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Human-readable syntax tree dump
// Objective: Render programs as an indented node-kind tree for the CLI
//=====================================================

use std::fmt::{self, Write};

use super::{
    ArmBody, AssignTarget, Block, Expr, ExprKind, FunctionBody, Literal, MatchArm, NodeKind,
    Pattern, Program, Stmt, StmtKind,
};

pub fn write_program(out: &mut dyn Write, program: &Program) -> fmt::Result {
    writeln!(out, "Program")?;
    for stmt in program.statements() {
        write_stmt(out, stmt, 1)?;
    }
    Ok(())
}

fn label(kind: NodeKind) -> String {
    match kind {
        NodeKind::Terminal(kind) => format!("{:?}", kind),
        NodeKind::NonTerminal(kind) => format!("{:?}", kind),
    }
}

fn indent(out: &mut dyn Write, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        out.write_str("  ")?;
    }
    Ok(())
}

fn write_block(out: &mut dyn Write, block: &Block, depth: usize) -> fmt::Result {
    indent(out, depth)?;
    writeln!(out, "Block")?;
    for stmt in &block.statements {
        write_stmt(out, stmt, depth + 1)?;
    }
    Ok(())
}

fn write_stmt(out: &mut dyn Write, stmt: &Stmt, depth: usize) -> fmt::Result {
    indent(out, depth)?;
    write!(out, "{}", label(stmt.node_kind()))?;
    match &stmt.kind {
        StmtKind::Declare { kind, declarators } => {
            writeln!(out, " {:?}", kind)?;
            for declarator in declarators {
                indent(out, depth + 1)?;
                writeln!(out, "{}", pattern_text(&declarator.target))?;
                if let Some(value) = &declarator.value {
                    write_expr(out, value, depth + 2)?;
                }
            }
        }
        StmtKind::Function(def) => {
            writeln!(
                out,
                " {}({})",
                def.name.as_deref().unwrap_or("<anonymous>"),
                def.params.join(", ")
            )?;
            write_function_body(out, &def.body, depth + 1)?;
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            writeln!(out)?;
            write_expr(out, condition, depth + 1)?;
            write_block(out, then_branch, depth + 1)?;
            if let Some(else_branch) = else_branch {
                write_block(out, else_branch, depth + 1)?;
            }
        }
        StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
            writeln!(out)?;
            write_expr(out, condition, depth + 1)?;
            write_block(out, body, depth + 1)?;
        }
        StmtKind::For {
            init,
            condition,
            update,
            body,
        } => {
            writeln!(out)?;
            if let Some(init) = init {
                write_stmt(out, init, depth + 1)?;
            }
            if let Some(condition) = condition {
                write_expr(out, condition, depth + 1)?;
            }
            if let Some(update) = update {
                write_expr(out, update, depth + 1)?;
            }
            write_block(out, body, depth + 1)?;
        }
        StmtKind::Each {
            item,
            index,
            iterable,
            body,
        } => {
            match index {
                Some(index) => writeln!(out, " ({}, {})", item, index)?,
                None => writeln!(out, " {}", item)?,
            }
            write_expr(out, iterable, depth + 1)?;
            write_block(out, body, depth + 1)?;
        }
        StmtKind::Match { scrutinee, arms } => {
            writeln!(out)?;
            write_expr(out, scrutinee, depth + 1)?;
            write_arms(out, arms, depth + 1)?;
        }
        StmtKind::Return(value) => {
            writeln!(out)?;
            if let Some(value) = value {
                write_expr(out, value, depth + 1)?;
            }
        }
        StmtKind::Break | StmtKind::Continue => writeln!(out)?,
        StmtKind::Import { items, module } => {
            let names: Vec<String> = items
                .iter()
                .map(|item| match &item.alias {
                    Some(alias) => format!("{} as {}", item.name, alias),
                    None => item.name.clone(),
                })
                .collect();
            writeln!(out, " {} from {}", names.join(", "), module)?;
        }
        StmtKind::Export(names) => writeln!(out, " {}", names.join(", "))?,
        StmtKind::Namespace { name, body } => {
            writeln!(out, " {}", name)?;
            write_block(out, body, depth + 1)?;
        }
        StmtKind::Expression { expr, terminated } => {
            writeln!(out, "{}", if *terminated { "" } else { " (tail)" })?;
            write_expr(out, expr, depth + 1)?;
        }
    }
    Ok(())
}

fn write_function_body(out: &mut dyn Write, body: &FunctionBody, depth: usize) -> fmt::Result {
    match body {
        FunctionBody::Block(block) => write_block(out, block, depth),
        FunctionBody::Expr(expr) => write_expr(out, expr, depth),
    }
}

fn write_arms(out: &mut dyn Write, arms: &[MatchArm], depth: usize) -> fmt::Result {
    for arm in arms {
        indent(out, depth)?;
        writeln!(
            out,
            "Arm {}{}",
            pattern_text(&arm.pattern),
            if arm.guard.is_some() { " if" } else { "" }
        )?;
        if let Some(guard) = &arm.guard {
            write_expr(out, guard, depth + 1)?;
        }
        match &arm.body {
            ArmBody::Block(block) => write_block(out, block, depth + 1)?,
            ArmBody::Expr(expr) => write_expr(out, expr, depth + 1)?,
        }
    }
    Ok(())
}

fn write_expr(out: &mut dyn Write, expr: &Expr, depth: usize) -> fmt::Result {
    indent(out, depth)?;
    write!(out, "{}", label(expr.node_kind()))?;
    let next = depth + 1;
    match &expr.kind {
        ExprKind::Literal(literal) => writeln!(out, " {}", literal_text(literal)),
        ExprKind::Identifier(name) | ExprKind::External(name) => writeln!(out, " {}", name),
        ExprKind::This | ExprKind::Base => writeln!(out),
        ExprKind::Scoped { namespace, name } => {
            writeln!(out, " ::{}", name)?;
            write_expr(out, namespace, next)
        }
        ExprKind::Array(items) | ExprKind::Tuple(items) => {
            writeln!(out)?;
            items.iter().try_for_each(|item| write_expr(out, item, next))
        }
        ExprKind::Map(entries) => {
            writeln!(out)?;
            for (key, value) in entries {
                write_expr(out, key, next)?;
                write_expr(out, value, next + 1)?;
            }
            Ok(())
        }
        ExprKind::Entity(members) => {
            writeln!(out)?;
            for member in members {
                indent(out, next)?;
                writeln!(out, "{}:", member.name)?;
                write_expr(out, &member.value, next + 1)?;
            }
            Ok(())
        }
        ExprKind::Extend { base, members } => {
            writeln!(out)?;
            write_expr(out, base, next)?;
            for member in members {
                indent(out, next)?;
                writeln!(out, "{}:", member.name)?;
                write_expr(out, &member.value, next + 1)?;
            }
            Ok(())
        }
        ExprKind::Construct { class, members } => {
            writeln!(out, " {}", class)?;
            for member in members {
                indent(out, next)?;
                writeln!(out, "{}:", member.name)?;
                write_expr(out, &member.value, next + 1)?;
            }
            Ok(())
        }
        ExprKind::Unary { op, operand } => {
            writeln!(out, " {:?}", op)?;
            write_expr(out, operand, next)
        }
        ExprKind::Binary { op, left, right } => {
            writeln!(out, " {}", op.symbol())?;
            write_expr(out, left, next)?;
            write_expr(out, right, next)
        }
        ExprKind::TypeTest { value, type_name } => {
            writeln!(out, " <: {:?}", type_name)?;
            write_expr(out, value, next)
        }
        ExprKind::Update { op, prefix, target } => {
            writeln!(out, " {:?}{}", op, if *prefix { " prefix" } else { " postfix" })?;
            write_expr(out, target, next)
        }
        ExprKind::Assign { op, target, value } => {
            writeln!(out, " {:?}", op)?;
            match target {
                AssignTarget::Place(place) => write_expr(out, place, next)?,
                AssignTarget::Pattern(pattern) => {
                    indent(out, next)?;
                    writeln!(out, "{}", pattern_text(pattern))?;
                }
            }
            write_expr(out, value, next)
        }
        ExprKind::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            writeln!(out)?;
            write_expr(out, condition, next)?;
            write_expr(out, then_branch, next)?;
            write_expr(out, else_branch, next)
        }
        ExprKind::Pipe { value, function } => {
            writeln!(out)?;
            write_expr(out, value, next)?;
            write_expr(out, function, next)
        }
        ExprKind::Call { callee, args } => {
            writeln!(out)?;
            write_expr(out, callee, next)?;
            args.iter().try_for_each(|arg| write_expr(out, arg, next))
        }
        ExprKind::Member { object, name } => {
            writeln!(out, " .{}", name)?;
            write_expr(out, object, next)
        }
        ExprKind::TupleIndex { object, index } => {
            writeln!(out, " .{}", index)?;
            write_expr(out, object, next)
        }
        ExprKind::Index { object, index } => {
            writeln!(out)?;
            write_expr(out, object, next)?;
            write_expr(out, index, next)
        }
        ExprKind::Function(def) => {
            writeln!(out, " ({})", def.params.join(", "))?;
            write_function_body(out, &def.body, next)
        }
        ExprKind::Block(block) | ExprKind::Async(block) | ExprKind::Safe(block) => {
            writeln!(out)?;
            write_block(out, block, next)
        }
        ExprKind::Lock { key, body } => {
            writeln!(out)?;
            if let Some(key) = key {
                write_expr(out, key, next)?;
            }
            write_block(out, body, next)
        }
        ExprKind::Match { scrutinee, arms } => {
            writeln!(out)?;
            write_expr(out, scrutinee, next)?;
            write_arms(out, arms, next)
        }
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Number(n) => n.to_string(),
        Literal::String(s) => format!("{:?}", s),
        Literal::Bool(b) => b.to_string(),
        Literal::Null => "null".to_string(),
        Literal::Unit => "()".to_string(),
    }
}

pub fn pattern_text(pattern: &Pattern) -> String {
    match pattern {
        Pattern::Wildcard => "_".to_string(),
        Pattern::Rest => "..".to_string(),
        Pattern::Bind(name) => name.clone(),
        Pattern::Literal(literal) => literal_text(literal),
        Pattern::Tuple(items) => format!(
            "({})",
            items.iter().map(pattern_text).collect::<Vec<_>>().join(", ")
        ),
        Pattern::Array(items) => format!(
            "[{}]",
            items.iter().map(pattern_text).collect::<Vec<_>>().join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;

    #[test]
    fn dump_names_node_kinds() {
        let ast = parse("m", "let a = (1, 2); a.1").expect("parse");
        let text = ast.program.to_string();
        assert!(text.starts_with("Program"));
        assert!(text.contains("Declare Let"));
        assert!(text.contains("TupleLiteral"));
        assert!(text.contains("TupleIndex .1"));
    }
}

//=====================================================
// End of file
//=====================================================
