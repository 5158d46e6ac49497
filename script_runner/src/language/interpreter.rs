//! Tree-walking evaluator for checked programs.
//!
//! Every statement and loop iteration is a step. The interrupt flag is
//! polled on each step and the wall-clock deadline every
//! [`DEADLINE_CHECK_INTERVAL`] steps. Memory is accounted per variable as
//! values are bound; operations that can grow a value are checked against
//! the remaining allowance before anything is built.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::LanguageError;
use super::ast::*;
use super::builtins::{self, answers_map};
use super::value::{
    Eval, Fault, VALUE_OVERHEAD, Value, binary_op, compare, get_index, get_slice, reserve,
    resolve_index,
};

const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Data a script is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    pub student_answers: BTreeMap<String, String>,
    pub question_id: String,
    pub answer: String,
}

/// Execution limits for one run.
#[derive(Debug, Clone)]
pub struct Budget {
    pub deadline: Instant,
    pub memory_bytes: usize,
    pub interrupt: Arc<AtomicBool>,
}

/// Final values of the two output variables. Coercion into a score is the
/// caller's job.
#[derive(Debug, Clone, PartialEq)]
pub struct Outputs {
    pub points_awarded: Value,
    pub feedback: Value,
}

enum Flow {
    Normal,
    Break,
    Continue,
}

type Exec<T> = Result<T, LanguageError>;

struct Interpreter<'b> {
    vars: HashMap<String, Value>,
    sizes: HashMap<String, usize>,
    used: usize,
    steps: u64,
    budget: &'b Budget,
}

/// Runs `program` to completion against `inputs`.
pub fn execute(program: &Program, inputs: &Inputs, budget: &Budget) -> Result<Outputs, LanguageError> {
    let mut vars = HashMap::new();
    vars.insert(
        "student_answers".to_string(),
        answers_map(&inputs.student_answers),
    );
    vars.insert(
        "question_id".to_string(),
        Value::Str(inputs.question_id.clone()),
    );
    vars.insert("answer".to_string(), Value::Str(inputs.answer.clone()));
    vars.insert("points_awarded".to_string(), Value::Float(0.0));
    vars.insert("feedback".to_string(), Value::Str(String::new()));

    let mut interpreter = Interpreter {
        vars,
        sizes: HashMap::new(),
        used: 0,
        steps: 0,
        budget,
    };
    match interpreter.block(&program.body)? {
        Flow::Normal => {}
        Flow::Break | Flow::Continue => {
            return Err(LanguageError::Runtime {
                message: "'break' or 'continue' outside a loop".into(),
                line: program.body.last().map_or(1, |s| s.pos.line),
            });
        }
    }

    let mut vars = interpreter.vars;
    Ok(Outputs {
        points_awarded: vars.remove("points_awarded").unwrap_or(Value::None),
        feedback: vars.remove("feedback").unwrap_or(Value::None),
    })
}

fn raise(fault: Fault, pos: Position) -> LanguageError {
    match fault {
        Fault::Message(message) => LanguageError::Runtime {
            message,
            line: pos.line,
        },
        Fault::Memory => LanguageError::MemoryExhausted { line: pos.line },
    }
}

fn runtime(message: impl Into<String>, pos: Position) -> LanguageError {
    LanguageError::Runtime {
        message: message.into(),
        line: pos.line,
    }
}

fn child<'v>(value: &'v Value, index: &Value) -> Eval<&'v Value> {
    match (value, index) {
        (Value::List(items), Value::Int(i)) => resolve_index(*i, items.len())
            .map(|i| &items[i])
            .ok_or_else(|| Fault::Message("list index out of range".into())),
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .ok_or_else(|| Fault::Message(format!("key not found: '{key}'"))),
        (Value::Map(_), other) => {
            Err(format!("map keys must be strings, not '{}'", other.type_name()).into())
        }
        (other, _) => Err(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        )
        .into()),
    }
}

/// Writes `value` at `indices` inside `slot`. Returns the footprint removed
/// and the footprint added.
fn store(slot: &mut Value, indices: &[Value], value: Value, allowance: usize) -> Eval<(usize, usize)> {
    let Some((first, rest)) = indices.split_first() else {
        let added = value.footprint();
        reserve(added, allowance)?;
        let old = std::mem::replace(slot, value);
        return Ok((old.footprint(), added));
    };
    match slot {
        Value::List(items) => {
            let Value::Int(i) = first else {
                return Err(format!("indices must be integers, not '{}'", first.type_name()).into());
            };
            let idx = resolve_index(*i, items.len())
                .ok_or_else(|| Fault::Message("list assignment index out of range".into()))?;
            store(&mut items[idx], rest, value, allowance)
        }
        Value::Map(map) => {
            let Value::Str(key) = first else {
                return Err(format!("map keys must be strings, not '{}'", first.type_name()).into());
            };
            if rest.is_empty() && !map.contains_key(key) {
                let added = VALUE_OVERHEAD + key.len() + value.footprint();
                reserve(added, allowance)?;
                map.insert(key.clone(), value);
                return Ok((0, added));
            }
            let entry = map
                .get_mut(key)
                .ok_or_else(|| Fault::Message(format!("key not found: '{key}'")))?;
            store(entry, rest, value, allowance)
        }
        Value::Str(_) => Err("strings cannot be modified in place".into()),
        other => Err(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        )
        .into()),
    }
}

impl Interpreter<'_> {
    fn tick(&mut self) -> Exec<()> {
        self.steps += 1;
        if self.budget.interrupt.load(Ordering::Relaxed) {
            return Err(LanguageError::Interrupted);
        }
        if self.steps % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= self.budget.deadline {
            return Err(LanguageError::Interrupted);
        }
        Ok(())
    }

    fn allowance(&self) -> usize {
        self.budget.memory_bytes.saturating_sub(self.used)
    }

    fn account(&mut self, name: &str, removed: usize, added: usize, pos: Position) -> Exec<()> {
        let size = self.sizes.entry(name.to_string()).or_insert(0);
        *size = size.saturating_sub(removed) + added;
        self.used = self.used.saturating_sub(removed) + added;
        if self.used > self.budget.memory_bytes {
            return Err(LanguageError::MemoryExhausted { line: pos.line });
        }
        Ok(())
    }

    fn set_var(&mut self, name: &str, value: Value, pos: Position) -> Exec<()> {
        let added = value.footprint();
        let removed = self.sizes.get(name).copied().unwrap_or(0);
        if self.used.saturating_sub(removed) + added > self.budget.memory_bytes {
            return Err(LanguageError::MemoryExhausted { line: pos.line });
        }
        self.vars.insert(name.to_string(), value);
        self.account(name, removed, added, pos)
    }

    fn restore_var(&mut self, name: &str, saved: Option<Value>, pos: Position) -> Exec<()> {
        match saved {
            Some(value) => self.set_var(name, value, pos),
            None => {
                self.vars.remove(name);
                let removed = self.sizes.remove(name).unwrap_or(0);
                self.used = self.used.saturating_sub(removed);
                Ok(())
            }
        }
    }

    fn lookup(&self, name: &str, pos: Position) -> Exec<&Value> {
        self.vars
            .get(name)
            .ok_or_else(|| runtime(format!("name '{name}' is not defined"), pos))
    }

    fn block(&mut self, body: &[Stmt]) -> Exec<Flow> {
        for stmt in body {
            match self.statement(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn bind_loop_vars(&mut self, vars: &[String], item: Value, pos: Position) -> Exec<()> {
        match vars {
            [single] => self.set_var(single, item, pos),
            [first, second] => match item {
                Value::List(mut pair) if pair.len() == 2 => {
                    let b = pair.pop().unwrap_or(Value::None);
                    let a = pair.pop().unwrap_or(Value::None);
                    self.set_var(first, a, pos)?;
                    self.set_var(second, b, pos)
                }
                other => Err(runtime(
                    format!("cannot unpack {} into two names", other.repr()),
                    pos,
                )),
            },
            _ => Err(runtime("loops bind one or two names", pos)),
        }
    }

    fn statement(&mut self, stmt: &Stmt) -> Exec<Flow> {
        self.tick()?;
        let pos = stmt.pos;
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value, pos)?;
            }
            StmtKind::AugAssign { target, op, value } => {
                let rhs = self.eval(value)?;
                let indices = self.eval_all(&target.indices)?;
                let mut current = self.lookup(&target.name, pos)?;
                for index in &indices {
                    current = child(current, index).map_err(|f| raise(f, pos))?;
                }
                let updated =
                    binary_op(*op, current, &rhs, self.allowance()).map_err(|f| raise(f, pos))?;
                self.store_at(&target.name, &indices, updated, pos)?;
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.truthy() {
                        return self.block(body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.block(body);
                }
            }
            StmtKind::While { cond, body } => loop {
                self.tick()?;
                if !self.eval(cond)?.truthy() {
                    break;
                }
                match self.block(body)? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                }
            },
            StmtKind::For { vars, iter, body } => {
                let items = self.eval(iter)?.iterate(self.allowance()).map_err(|f| raise(f, pos))?;
                for item in items {
                    self.tick()?;
                    self.bind_loop_vars(vars, item, pos)?;
                    match self.block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Expr(expr) => {
                if !self.mutate_in_place(expr)? {
                    self.eval(expr)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, target: &Target, value: Value, pos: Position) -> Exec<()> {
        if target.indices.is_empty() {
            return self.set_var(&target.name, value, pos);
        }
        let indices = self.eval_all(&target.indices)?;
        self.store_at(&target.name, &indices, value, pos)
    }

    fn store_at(&mut self, name: &str, indices: &[Value], value: Value, pos: Position) -> Exec<()> {
        if indices.is_empty() {
            return self.set_var(name, value, pos);
        }
        let allowance = self.allowance();
        let slot = self
            .vars
            .get_mut(name)
            .ok_or_else(|| runtime(format!("name '{name}' is not defined"), pos))?;
        let (removed, added) = store(slot, indices, value, allowance).map_err(|f| raise(f, pos))?;
        self.account(name, removed, added, pos)
    }

    /// `xs.append(v)` / `xs.extend(vs)` as a statement on a list variable
    /// updates it instead of building a copy. Returns false when the
    /// statement is not of that shape.
    fn mutate_in_place(&mut self, expr: &Expr) -> Exec<bool> {
        let ExprKind::Call { name, args } = &expr.kind else {
            return Ok(false);
        };
        if !builtins::MUTATING.contains(&name.as_str()) || args.len() != 2 {
            return Ok(false);
        }
        let ExprKind::Name(receiver) = &args[0].kind else {
            return Ok(false);
        };
        if !matches!(self.vars.get(receiver), Some(Value::List(_))) {
            return Ok(false);
        }
        let pos = expr.pos;
        let argument = self.eval(&args[1])?;
        let extra = if name == "append" {
            vec![argument]
        } else {
            argument.iterate(self.allowance()).map_err(|f| raise(f, pos))?
        };
        let added = extra.iter().map(Value::footprint).sum::<usize>();
        reserve(added, self.allowance()).map_err(|f| raise(f, pos))?;
        if let Some(Value::List(items)) = self.vars.get_mut(receiver) {
            items.extend(extra);
        }
        self.account(receiver, 0, added, pos)?;
        Ok(true)
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Exec<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval(&mut self, expr: &Expr) -> Exec<Value> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            ExprKind::Name(name) => self.lookup(name, pos).cloned(),
            ExprKind::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut size = 0usize;
                for item in items {
                    let value = self.eval(item)?;
                    size += value.footprint();
                    reserve(size, self.allowance()).map_err(|f| raise(f, pos))?;
                    out.push(value);
                }
                Ok(Value::List(out))
            }
            ExprKind::Map(entries) => {
                let mut map = BTreeMap::new();
                let mut size = VALUE_OVERHEAD;
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(runtime(
                                format!("map keys must be strings, not '{}'", other.type_name()),
                                pos,
                            ));
                        }
                    };
                    let value = self.eval(value)?;
                    size += VALUE_OVERHEAD + key.len() + value.footprint();
                    reserve(size, self.allowance()).map_err(|f| raise(f, pos))?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value).map_err(|f| raise(f, pos))
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary_op(*op, &l, &r, self.allowance()).map_err(|f| raise(f, pos))
            }
            ExprKind::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, next) in rest {
                    let right = self.eval(next)?;
                    if !compare(*op, &left, &right).map_err(|f| raise(f, pos))? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::And(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() { self.eval(right) } else { Ok(l) }
            }
            ExprKind::Or(left, right) => {
                let l = self.eval(left)?;
                if l.truthy() { Ok(l) } else { self.eval(right) }
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            ExprKind::Call { name, args } => {
                let args = self.eval_all(args)?;
                builtins::call(name, args, self.allowance()).map_err(|f| raise(f, pos))
            }
            ExprKind::Index { base, index } => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                get_index(&base, &index).map_err(|f| raise(f, pos))
            }
            ExprKind::Slice { base, start, end } => {
                let base = self.eval(base)?;
                let start = start.as_deref().map(|e| self.eval(e)).transpose()?;
                let end = end.as_deref().map(|e| self.eval(e)).transpose()?;
                get_slice(&base, start.as_ref(), end.as_ref()).map_err(|f| raise(f, pos))
            }
            ExprKind::Comprehension {
                element,
                vars,
                iter,
                filter,
            } => self.comprehension(element, vars, iter, filter.as_deref(), pos),
        }
    }

    fn comprehension(
        &mut self,
        element: &Expr,
        vars: &[String],
        iter: &Expr,
        filter: Option<&Expr>,
        pos: Position,
    ) -> Exec<Value> {
        let items = self.eval(iter)?.iterate(self.allowance()).map_err(|f| raise(f, pos))?;
        let saved: Vec<(String, Option<Value>)> = vars
            .iter()
            .map(|v| (v.clone(), self.vars.get(v).cloned()))
            .collect();

        let result = self.collect(element, vars, items, filter, pos);

        for (name, value) in saved {
            self.restore_var(&name, value, pos)?;
        }
        result.map(Value::List)
    }

    fn collect(
        &mut self,
        element: &Expr,
        vars: &[String],
        items: Vec<Value>,
        filter: Option<&Expr>,
        pos: Position,
    ) -> Exec<Vec<Value>> {
        let mut out = Vec::new();
        let mut size = 0usize;
        for item in items {
            self.tick()?;
            self.bind_loop_vars(vars, item, pos)?;
            if let Some(filter) = filter {
                if !self.eval(filter)?.truthy() {
                    continue;
                }
            }
            let value = self.eval(element)?;
            size += value.footprint();
            reserve(size, self.allowance()).map_err(|f| raise(f, pos))?;
            out.push(value);
        }
        Ok(out)
    }
}

fn unary(op: UnaryOp, value: Value) -> Eval<Value> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Fault::Message("integer overflow".into())),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(b))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (op, v) => Err(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::compile;
    use std::time::Duration;

    fn budget(memory_bytes: usize) -> Budget {
        Budget {
            deadline: Instant::now() + Duration::from_secs(5),
            memory_bytes,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    fn run(src: &str, answer: &str) -> Result<Outputs, LanguageError> {
        let program = compile(src).unwrap();
        let inputs = Inputs {
            student_answers: BTreeMap::from([("q1".to_string(), answer.to_string())]),
            question_id: "q1".into(),
            answer: answer.into(),
        };
        execute(&program, &inputs, &budget(1 << 20))
    }

    #[test]
    fn test_defaults_when_script_sets_nothing() {
        let out = run("x = 1", "").unwrap();
        assert_eq!(out.points_awarded, Value::Float(0.0));
        assert_eq!(out.feedback, Value::Str(String::new()));
    }

    #[test]
    fn test_typical_grading_script() {
        let src = r#"
words = answer.lower().split()
hits = [w for w in words if w in ["chlorophyll", "sunlight"]]
points_awarded = len(hits) * 2.5
feedback = "Found {} of 2".format(len(hits))
"#;
        let out = run(src, "Sunlight and chlorophyll").unwrap();
        assert_eq!(out.points_awarded, Value::Float(5.0));
        assert_eq!(out.feedback, Value::Str("Found 2 of 2".into()));
    }

    #[test]
    fn test_loops_and_in_place_updates() {
        let src = r#"
xs = []
for i in range(10) {
    if i % 2 == 0 { continue }
    xs.append(i)
    if len(xs) == 3 { break }
}
grid = [[0, 0], [0, 0]]
grid[1][0] += 7
counts = {}
for k, v in items({"a": 1, "b": 2}) { counts[k] = v * 10 }
points_awarded = sum(xs) + grid[1][0] + counts["b"]
"#;
        let out = run(src, "").unwrap();
        assert_eq!(out.points_awarded, Value::Int(1 + 3 + 5 + 7 + 20));
    }

    #[test]
    fn test_comprehension_variable_does_not_leak() {
        let src = "i = 'kept'\nys = [i * 2 for i in range(3)]\nfeedback = i";
        let out = run(src, "").unwrap();
        assert_eq!(out.feedback, Value::Str("kept".into()));
    }

    #[test]
    fn test_runtime_error_reports_line() {
        let err = run("x = 1\ny = x / 0", "").unwrap_err();
        assert_eq!(
            err,
            LanguageError::Runtime {
                message: "division by zero".into(),
                line: 2
            }
        );
    }

    #[test]
    fn test_memory_budget_is_enforced() {
        let program = compile("xs = []\nwhile true { xs.append('xxxxxxxxxxxxxxxx') }").unwrap();
        let err = execute(&program, &Inputs::default(), &budget(64 * 1024)).unwrap_err();
        assert!(matches!(err, LanguageError::MemoryExhausted { .. }));
    }

    fn exhausts(src: &str, memory_bytes: usize) -> bool {
        let program = compile(src).unwrap();
        matches!(
            execute(&program, &Inputs::default(), &budget(memory_bytes)),
            Err(LanguageError::MemoryExhausted { .. })
        )
    }

    #[test]
    fn test_iterating_a_large_string_is_budgeted() {
        let src = "s = 'a' * 50000\nn = 0\nfor c in s { n += 1 }";
        assert!(exhausts(src, 256 * 1024));
        assert!(!exhausts(src, 8 << 20));
    }

    #[test]
    fn test_map_literal_is_budgeted() {
        let src = "s = 'x' * 40000\nm = {'a': s, 'b': s, 'c': s, 'd': s, 'e': s, 'f': s, 'g': s, 'h': s}";
        assert!(exhausts(src, 128 * 1024));
        assert!(!exhausts(src, 1 << 20));
    }

    #[test]
    fn test_comprehension_over_large_values_is_budgeted() {
        assert!(exhausts("s = 'a' * 50000\nxs = [c for c in s]", 256 * 1024));
        assert!(exhausts(
            "s = 'x' * 20000\nxs = [s, s, s]\nys = [x + x for x in xs]",
            128 * 1024
        ));
    }

    #[test]
    fn test_extend_with_large_string_is_budgeted() {
        assert!(exhausts("xs = []\nxs.extend('a' * 50000)", 256 * 1024));
    }

    #[test]
    fn test_interrupt_stops_infinite_loop() {
        let program = compile("while true { pass }").unwrap();
        let b = budget(1 << 20);
        b.interrupt.store(true, Ordering::Relaxed);
        assert_eq!(
            execute(&program, &Inputs::default(), &b).unwrap_err(),
            LanguageError::Interrupted
        );
    }

    #[test]
    fn test_deadline_stops_infinite_loop() {
        let program = compile("n = 0\nwhile true { n += 1 }").unwrap();
        let b = Budget {
            deadline: Instant::now() + Duration::from_millis(20),
            memory_bytes: 1 << 20,
            interrupt: Arc::new(AtomicBool::new(false)),
        };
        assert_eq!(
            execute(&program, &Inputs::default(), &b).unwrap_err(),
            LanguageError::Interrupted
        );
    }
}
