//! Sandbox construction and invocation
//!
//! One fresh engine per invocation, assembled from a raw Rhai engine
//! plus hand-picked packages. The time package and any source of
//! randomness or I/O are never registered, so contracts observe nothing
//! but the transaction and the document store. Execution is bounded by
//! an operation-fuel limit and a wall-clock deadline shared across
//! nested contract calls.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Instant;

use rhai::packages::{
    BasicArrayPackage, BasicMapPackage, BasicMathPackage, CorePackage, MoreStringPackage, Package,
};
use rhai::{Dynamic, Engine, EvalAltResult, Map, Module, Scope};
use serde_json::{json, Value};
use tracing::debug;

use meridian_core::constants::{CONTRACT_INIT_ACTION, MAX_CONTRACT_CALL_DEPTH, VM_MAX_OPERATIONS};
use meridian_core::types::{is_valid_table_name, Contract, ContractEvent, TransactionLogs};

use crate::currency::currency_module;
use crate::executor::SmartContracts;
use crate::tables::{map_to_value, value_to_map, TableRef};

/// Payload fields forwarded from a caller's payload into the sanitized
/// params of an inter-contract call. They carry value/auth context, so
/// the outer transaction always wins over the callee-provided value.
const FORWARDED_PARAMS: [&str; 3] = ["amountSTEEMSBD", "recipient", "isSignedWithActiveKey"];

/// Which entry point is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Deploy,
    Execute,
}

/// Everything one contract invocation can see.
pub(crate) struct Invocation {
    pub phase: Phase,
    pub contract: Contract,
    pub sender: String,
    pub ref_block: u64,
    pub action: String,
    pub params: Value,
    pub depth: usize,
    pub deadline: Instant,
}

/// Run the wrapped contract source of `inv` to completion.
///
/// Contract-visible failures are recorded on `logs` by the host API;
/// the returned error is the single `<ErrorKind>: <message>` string for
/// a parse failure, runtime fault or exceeded budget.
pub(crate) fn run_contract(
    executor: &SmartContracts,
    inv: &Invocation,
    logs: &Rc<RefCell<TransactionLogs>>,
    tables: Option<&Rc<RefCell<BTreeSet<String>>>>,
) -> Result<(), String> {
    let engine = build_engine(executor, inv, logs, tables);

    let mut scope = Scope::new();
    scope.push_constant("sender", inv.sender.clone());
    scope.push_constant("owner", inv.contract.owner.clone());
    scope.push_constant("action", inv.action.clone());
    scope.push_constant("ref_block", inv.ref_block as i64);
    let payload =
        rhai::serde::to_dynamic(&inv.params).map_err(|e| format!("RuntimeError: {e}"))?;
    scope.push_constant("payload", payload);

    engine
        .run_with_scope(&mut scope, &inv.contract.code)
        .map_err(|err| describe_error(&err))
}

fn build_engine(
    executor: &SmartContracts,
    inv: &Invocation,
    logs: &Rc<RefCell<TransactionLogs>>,
    tables: Option<&Rc<RefCell<BTreeSet<String>>>>,
) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(CorePackage::new().as_shared_module());
    engine.register_global_module(BasicArrayPackage::new().as_shared_module());
    engine.register_global_module(BasicMapPackage::new().as_shared_module());
    engine.register_global_module(BasicMathPackage::new().as_shared_module());
    engine.register_global_module(MoreStringPackage::new().as_shared_module());

    engine.set_max_operations(VM_MAX_OPERATIONS);
    let deadline = inv.deadline;
    engine.on_progress(move |_| {
        if Instant::now() >= deadline {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });
    engine.on_print(|_| {});
    engine.on_debug(|text, _source, _pos| debug!(target: "contract", "{text}"));

    register_tables(&mut engine);
    register_db_module(&mut engine, executor, inv, tables);
    engine.register_static_module("currency", currency_module().into());
    register_emit(&mut engine, logs.clone());
    register_assert(&mut engine, logs.clone());
    register_execute_smart_contract(&mut engine, executor, inv, logs.clone());

    engine
}

fn register_tables(engine: &mut Engine) {
    engine.register_type_with_name::<TableRef>("Table");
    engine.register_fn("insert", |table: &mut TableRef, doc: Map| table.insert(doc));
    engine.register_fn("find", |table: &mut TableRef, query: Map| table.find(query));
    engine.register_fn("find_one", |table: &mut TableRef, query: Map| {
        table.find_one(query)
    });
    engine.register_fn("update", |table: &mut TableRef, doc: Map| table.update(doc));
    engine.register_fn("remove", |table: &mut TableRef, doc: Map| table.remove(doc));
}

fn register_db_module(
    engine: &mut Engine,
    executor: &SmartContracts,
    inv: &Invocation,
    tables: Option<&Rc<RefCell<BTreeSet<String>>>>,
) {
    let mut module = Module::new();
    let db = executor.database();

    match inv.phase {
        Phase::Deploy => {
            // Table creation exists only in the deploy sandbox.
            let created = tables
                .expect("deploy invocation without a table set")
                .clone();
            let db = db.clone();
            let contract_name = inv.contract.name.clone();
            module.set_native_fn(
                "create_table",
                move |name: &str| -> Result<TableRef, Box<EvalAltResult>> {
                    if !is_valid_table_name(name) {
                        return Err(format!("invalid table name '{name}'").into());
                    }
                    let qualified = format!("{contract_name}_{name}");
                    db.create_collection(&qualified);
                    created.borrow_mut().insert(qualified.clone());
                    Ok(TableRef::new(qualified, db.clone()))
                },
            );
        }
        Phase::Execute => {
            let db = db.clone();
            let contract = inv.contract.clone();
            module.set_native_fn(
                "get_table",
                move |name: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                    let qualified = contract.qualified_table(name);
                    if contract.owns_table(&qualified) {
                        Ok(Dynamic::from(TableRef::new(qualified, db.clone())))
                    } else {
                        Ok(Dynamic::UNIT)
                    }
                },
            );
        }
    }

    // Read-only cross-contract queries, available in both phases.
    {
        let db = db.clone();
        module.set_native_fn(
            "find_in_table",
            move |contract: &str, table: &str, query: Map| -> Result<rhai::Array, Box<EvalAltResult>> {
                let query = map_to_value(query)?;
                db.find(&format!("{contract}_{table}"), &query)
                    .into_iter()
                    .map(|doc| rhai::serde::to_dynamic(&doc))
                    .collect()
            },
        );
    }
    {
        let db = db.clone();
        module.set_native_fn(
            "find_one_in_table",
            move |contract: &str, table: &str, query: Map| -> Result<Dynamic, Box<EvalAltResult>> {
                let query = map_to_value(query)?;
                match db.find_one(&format!("{contract}_{table}"), &query) {
                    Some(doc) => rhai::serde::to_dynamic(&doc),
                    None => Ok(Dynamic::UNIT),
                }
            },
        );
    }

    engine.register_static_module("db", module.into());
}

fn register_emit(engine: &mut Engine, logs: Rc<RefCell<TransactionLogs>>) {
    engine.register_fn(
        "emit",
        move |event: Dynamic, data: Dynamic| -> Result<(), Box<EvalAltResult>> {
            if !event.is_string() {
                return Ok(());
            }
            let event = event.into_string().unwrap_or_default();
            let data: Value = rhai::serde::from_dynamic(&data)?;
            logs.borrow_mut().events.push(ContractEvent { event, data });
            Ok(())
        },
    );
}

fn register_assert(engine: &mut Engine, logs: Rc<RefCell<TransactionLogs>>) {
    engine.register_fn("assert", move |condition: Dynamic, message: Dynamic| -> bool {
        let ok = truthy(&condition);
        if !ok && message.is_string() {
            let message = message.into_string().unwrap_or_default();
            logs.borrow_mut().errors.push(message);
        }
        ok
    });
}

fn register_execute_smart_contract(
    engine: &mut Engine,
    executor: &SmartContracts,
    inv: &Invocation,
    logs: Rc<RefCell<TransactionLogs>>,
) {
    let executor = executor.clone();
    let outer_params = inv.params.clone();
    let sender = inv.sender.clone();
    let ref_block = inv.ref_block;
    let deadline = inv.deadline;
    let depth = inv.depth;

    engine.register_fn(
        "execute_smart_contract",
        move |contract: &str, action: &str, params_json: &str| -> Result<Map, Box<EvalAltResult>> {
            if action == CONTRACT_INIT_ACTION {
                let rejected = TransactionLogs {
                    errors: vec!["you cannot trigger the createSSC action".to_string()],
                    events: vec![],
                };
                return logs_to_map(&rejected);
            }

            let inner = if depth + 1 > MAX_CONTRACT_CALL_DEPTH {
                TransactionLogs {
                    errors: vec!["contract call depth limit reached".to_string()],
                    events: vec![],
                }
            } else {
                let params = sanitize_call_params(params_json, &outer_params);
                executor.execute_nested(&sender, ref_block, contract, action, params, deadline, depth + 1)
            };

            logs.borrow_mut().absorb(&inner);
            logs_to_map(&inner)
        },
    );
}

/// Parse callee params and copy the forwarded auth/value fields from the
/// caller's payload over them. A missing or malformed params string
/// sanitizes to an empty object.
fn sanitize_call_params(params_json: &str, outer_params: &Value) -> Value {
    let mut params = serde_json::from_str::<Value>(params_json).unwrap_or_else(|_| json!({}));
    if !params.is_object() {
        params = json!({});
    }
    if let (Value::Object(dst), Value::Object(src)) = (&mut params, outer_params) {
        for key in FORWARDED_PARAMS {
            if let Some(value) = src.get(key) {
                dst.insert(key.to_string(), value.clone());
            }
        }
    }
    params
}

fn logs_to_map(logs: &TransactionLogs) -> Result<Map, Box<EvalAltResult>> {
    let value = serde_json::to_value(logs)
        .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })?;
    value_to_map(value)
}

/// Script-side truthiness: unit and `false` and zero and the empty
/// string are falsy, everything else is truthy.
fn truthy(value: &Dynamic) -> bool {
    if value.is_unit() {
        return false;
    }
    if let Ok(flag) = value.as_bool() {
        return flag;
    }
    if let Ok(int) = value.as_int() {
        return int != 0;
    }
    if value.is_string() {
        return !value.clone().into_string().unwrap_or_default().is_empty();
    }
    true
}

fn describe_error(err: &EvalAltResult) -> String {
    match err {
        EvalAltResult::ErrorParsing(inner, _) => format!("SyntaxError: {inner}"),
        EvalAltResult::ErrorTerminated(_, _) => {
            "TimeoutError: contract execution exceeded the time budget".to_string()
        }
        EvalAltResult::ErrorTooManyOperations(_) => {
            "TimeoutError: contract execution exceeded the operation budget".to_string()
        }
        other => format!("RuntimeError: {other}"),
    }
}
