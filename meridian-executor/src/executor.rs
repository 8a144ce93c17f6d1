//! Contract deployment and execution
//!
//! The executor owns no state of its own: contracts and tables live in
//! the document store, so replaying the chain through a fresh executor
//! reproduces the same records.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::info;

use meridian_core::constants::{
    CONTRACTS_COLLECTION, CONTRACT_INIT_ACTION, DEPLOY_ACTION, DEPLOY_CONTRACT,
};
use meridian_core::types::{is_valid_contract_name, Contract, Transaction, TransactionLogs};
use meridian_store::Database;

use crate::error::{ExecutorError, ExecutorResult};
use crate::sandbox::{self, Invocation, Phase};
use crate::template;

/// The deterministic contract runtime.
#[derive(Clone)]
pub struct SmartContracts {
    db: Arc<Database>,
    vm_timeout: Duration,
}

impl SmartContracts {
    pub fn new(db: Arc<Database>, vm_timeout_ms: u64) -> Self {
        db.create_collection(CONTRACTS_COLLECTION);
        Self {
            db,
            vm_timeout: Duration::from_millis(vm_timeout_ms),
        }
    }

    pub(crate) fn database(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Route one transaction to `deploy` or `execute` and return its logs.
    pub fn process_transaction(&self, tx: &Transaction) -> TransactionLogs {
        match (tx.contract.as_deref(), tx.action.as_deref()) {
            (Some(DEPLOY_CONTRACT), Some(DEPLOY_ACTION)) => self.deploy(
                &tx.sender,
                tx.ref_anchor_block_number,
                tx.payload.as_deref(),
            ),
            (Some(contract), Some(action)) => self.execute(
                &tx.sender,
                tx.ref_anchor_block_number,
                contract,
                action,
                tx.payload.as_deref(),
            ),
            _ => error_logs("contract and action are required"),
        }
    }

    /// Deploy a contract: validate, wrap, run `createSSC`, persist.
    pub fn deploy(&self, sender: &str, ref_block: u64, payload: Option<&str>) -> TransactionLogs {
        let params = match parse_payload(payload) {
            Ok(value) => value,
            Err(message) => return error_logs(&message),
        };
        let Some(object) = params.as_object() else {
            return error_logs("invalid deploy payload");
        };

        let name = object.get("name").and_then(Value::as_str).unwrap_or("");
        if !is_valid_contract_name(name) {
            return error_logs("invalid contract name");
        }
        let code = object.get("code").and_then(Value::as_str).unwrap_or("");
        if code.is_empty() {
            return error_logs("missing contract code");
        }

        match self.contract_by_name(name) {
            Ok(Some(_)) => return error_logs("contract already exists"),
            Ok(None) => {}
            Err(e) => return error_logs(&e.to_string()),
        }

        let source = match template::decode_contract_code(code) {
            Ok(source) => source,
            Err(message) => return error_logs(&message),
        };

        let contract = Contract {
            name: name.to_string(),
            owner: sender.to_string(),
            code: template::wrap_contract_code(&source),
            tables: BTreeSet::new(),
        };

        let init_params = deploy_init_params(object.get("params"));
        let shared_logs = Rc::new(RefCell::new(TransactionLogs::default()));
        let created_tables = Rc::new(RefCell::new(BTreeSet::new()));
        let invocation = Invocation {
            phase: Phase::Deploy,
            contract: contract.clone(),
            sender: sender.to_string(),
            ref_block,
            action: CONTRACT_INIT_ACTION.to_string(),
            params: init_params,
            depth: 0,
            deadline: Instant::now() + self.vm_timeout,
        };

        let outcome = sandbox::run_contract(self, &invocation, &shared_logs, Some(&created_tables));
        let mut logs = shared_logs.take();

        match outcome {
            Ok(()) => {
                let mut contract = contract;
                contract.tables = created_tables.take();
                if let Err(e) = self.save_contract(&contract) {
                    logs.errors.push(e.to_string());
                } else {
                    info!(contract = %contract.name, owner = %contract.owner, "contract deployed");
                }
            }
            Err(message) => logs.errors.push(message),
        }

        logs
    }

    /// Execute a contract action.
    pub fn execute(
        &self,
        sender: &str,
        ref_block: u64,
        contract: &str,
        action: &str,
        payload: Option<&str>,
    ) -> TransactionLogs {
        let params = match parse_payload(payload) {
            Ok(value) => value,
            Err(message) => return error_logs(&message),
        };
        self.execute_nested(
            sender,
            ref_block,
            contract,
            action,
            params,
            Instant::now() + self.vm_timeout,
            0,
        )
    }

    /// Execution entry shared by top-level calls and reentrant
    /// `execute_smart_contract` calls: same sender, same deadline.
    pub(crate) fn execute_nested(
        &self,
        sender: &str,
        ref_block: u64,
        contract: &str,
        action: &str,
        params: Value,
        deadline: Instant,
        depth: usize,
    ) -> TransactionLogs {
        if action == CONTRACT_INIT_ACTION {
            return error_logs("you cannot trigger the createSSC action");
        }

        let record = match self.contract_by_name(contract) {
            Ok(Some(record)) => record,
            Ok(None) => return error_logs("contract doesn't exist"),
            Err(e) => return error_logs(&e.to_string()),
        };

        let shared_logs = Rc::new(RefCell::new(TransactionLogs::default()));
        let invocation = Invocation {
            phase: Phase::Execute,
            contract: record,
            sender: sender.to_string(),
            ref_block,
            action: action.to_string(),
            params,
            depth,
            deadline,
        };

        let outcome = sandbox::run_contract(self, &invocation, &shared_logs, None);
        let mut logs = shared_logs.take();
        if let Err(message) = outcome {
            logs.errors.push(message);
        }
        logs
    }

    /// Load a deployed contract record by name.
    pub fn contract_by_name(&self, name: &str) -> ExecutorResult<Option<Contract>> {
        match self
            .db
            .find_one(CONTRACTS_COLLECTION, &json!({ "name": name }))
        {
            Some(value) => serde_json::from_value(strip_id(value))
                .map(Some)
                .map_err(|e| ExecutorError::CorruptContract(e.to_string())),
            None => Ok(None),
        }
    }

    fn save_contract(&self, contract: &Contract) -> ExecutorResult<()> {
        let value = serde_json::to_value(contract)?;
        self.db.insert(CONTRACTS_COLLECTION, value)?;
        Ok(())
    }
}

/// Remove the store-assigned `_id` before deserializing into a typed record.
fn strip_id(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        map.remove("_id");
    }
    value
}

fn error_logs(message: &str) -> TransactionLogs {
    TransactionLogs {
        errors: vec![message.to_string()],
        events: vec![],
    }
}

/// Parse a transaction payload: absent means an empty object, malformed
/// is an error recorded on the logs.
fn parse_payload(payload: Option<&str>) -> Result<Value, String> {
    match payload {
        None => Ok(json!({})),
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("SyntaxError: {e}")),
    }
}

/// Deploy payloads may carry `params` either as an object or as JSON
/// text; both feed `createSSC`.
fn deploy_init_params(params: Option<&Value>) -> Value {
    match params {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|_| json!({})),
        Some(value) => value.clone(),
        None => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::encode_contract_code;

    fn executor() -> SmartContracts {
        SmartContracts::new(Arc::new(Database::new()), 1_000)
    }

    fn deploy_payload(name: &str, source: &str) -> String {
        json!({ "name": name, "code": encode_contract_code(source) }).to_string()
    }

    const TOKEN_SOURCE: &str = r#"
actions.createSSC = |payload| {
    db::create_table("balances");
};

actions.mint = |payload| {
    let balances = db::get_table("balances");
    balances.insert(#{ account: sender, amount: payload.amount });
    emit("mint", #{ account: sender, amount: payload.amount });
};
"#;

    #[test]
    fn deploy_and_execute_mint() {
        let exec = executor();

        let logs = exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));
        assert!(logs.errors.is_empty(), "deploy errors: {:?}", logs.errors);

        let logs = exec.execute("alice", 2, "tok", "mint", Some(r#"{"amount":"5"}"#));
        assert!(logs.errors.is_empty(), "mint errors: {:?}", logs.errors);
        assert_eq!(logs.events.len(), 1);
        assert_eq!(logs.events[0].event, "mint");

        let row = exec
            .database()
            .find_one("tok_balances", &json!({ "account": "alice" }))
            .expect("row inserted");
        assert_eq!(row["amount"], "5");
    }

    #[test]
    fn duplicate_deploy_is_rejected() {
        let exec = executor();
        let payload = deploy_payload("tok", TOKEN_SOURCE);

        assert!(exec.deploy("alice", 1, Some(&payload)).errors.is_empty());
        let logs = exec.deploy("bob", 2, Some(&payload));
        assert_eq!(logs.errors, vec!["contract already exists".to_string()]);

        // state unchanged: still owned by alice
        let record = exec.contract_by_name("tok").unwrap().unwrap();
        assert_eq!(record.owner, "alice");
    }

    #[test]
    fn deploy_records_created_tables() {
        let exec = executor();
        exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));

        let record = exec.contract_by_name("tok").unwrap().unwrap();
        assert!(record.owns_table("tok_balances"));
        assert!(exec.database().has_collection("tok_balances"));
    }

    #[test]
    fn deploy_validation_errors() {
        let exec = executor();

        let logs = exec.deploy("alice", 1, Some(r#"{"name":"bad name","code":"aGk="}"#));
        assert_eq!(logs.errors, vec!["invalid contract name".to_string()]);

        let logs = exec.deploy("alice", 1, Some(r#"{"name":"ok"}"#));
        assert_eq!(logs.errors, vec!["missing contract code".to_string()]);

        let logs = exec.deploy("alice", 1, Some("not json"));
        assert!(logs.errors[0].starts_with("SyntaxError:"));
    }

    #[test]
    fn execute_unknown_contract() {
        let exec = executor();
        let logs = exec.execute("alice", 1, "ghost", "run", None);
        assert_eq!(logs.errors, vec!["contract doesn't exist".to_string()]);
    }

    #[test]
    fn create_ssc_is_unreachable_after_deploy() {
        let exec = executor();
        exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));

        let logs = exec.execute("alice", 2, "tok", "createSSC", None);
        assert_eq!(
            logs.errors,
            vec!["you cannot trigger the createSSC action".to_string()]
        );
    }

    #[test]
    fn get_table_is_scoped_to_owned_tables() {
        let exec = executor();
        exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));

        let reader = r#"
actions.createSSC = |payload| {};

actions.peek = |payload| {
    let foreign = db::get_table("balances");
    if type_of(foreign) == "()" {
        emit("denied", #{});
    }
};
"#;
        exec.deploy("bob", 2, Some(&deploy_payload("reader", reader)));
        let logs = exec.execute("bob", 3, "reader", "peek", None);
        assert!(logs.errors.is_empty(), "errors: {:?}", logs.errors);
        assert_eq!(logs.events[0].event, "denied");
    }

    #[test]
    fn cross_contract_reads_are_allowed() {
        let exec = executor();
        exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));
        exec.execute("alice", 2, "tok", "mint", Some(r#"{"amount":"5"}"#));

        let auditor = r#"
actions.createSSC = |payload| {};

actions.audit = |payload| {
    let row = db::find_one_in_table("tok", "balances", #{ account: "alice" });
    assert(type_of(row) != "()", "missing balance row");
    emit("audited", #{ amount: row.amount });
};
"#;
        exec.deploy("carol", 3, Some(&deploy_payload("auditor", auditor)));
        let logs = exec.execute("carol", 4, "auditor", "audit", None);
        assert!(logs.errors.is_empty(), "errors: {:?}", logs.errors);
        assert_eq!(logs.events[0].data["amount"], "5");
    }

    #[test]
    fn assert_records_error_without_halting() {
        let exec = executor();
        let source = r#"
actions.createSSC = |payload| {};

actions.check = |payload| {
    assert(false, "first failure");
    emit("still_running", #{});
};
"#;
        exec.deploy("alice", 1, Some(&deploy_payload("chk", source)));
        let logs = exec.execute("alice", 2, "chk", "check", None);
        assert_eq!(logs.errors, vec!["first failure".to_string()]);
        assert_eq!(logs.events[0].event, "still_running");
    }

    #[test]
    fn cross_contract_call_forwards_value_context() {
        let exec = executor();
        exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));

        let router = r#"
actions.createSSC = |payload| {};

actions.route = |payload| {
    let result = execute_smart_contract("tok", "mint", "{\"amount\":\"1\"}");
    if "errors" in result {
        emit("route_failed", result);
    }
};
"#;
        exec.deploy("bob", 2, Some(&deploy_payload("router", router)));
        let logs = exec.execute(
            "dave",
            3,
            "router",
            "route",
            Some(r#"{"amountSTEEMSBD":"10"}"#),
        );
        assert!(logs.errors.is_empty(), "errors: {:?}", logs.errors);

        // inner sender is the outer sender, not the routing contract
        let row = exec
            .database()
            .find_one("tok_balances", &json!({ "account": "dave" }))
            .expect("row inserted");
        assert_eq!(row["amount"], "1");

        // callee events propagate to the outer logs
        assert!(logs.events.iter().any(|e| e.event == "mint"));
    }

    #[test]
    fn forwarded_fields_reach_the_callee() {
        let exec = executor();
        let sink = r#"
actions.createSSC = |payload| {};

actions.record = |payload| {
    emit("seen", payload);
};
"#;
        exec.deploy("alice", 1, Some(&deploy_payload("sink", sink)));

        let caller = r#"
actions.createSSC = |payload| {};

actions.call = |payload| {
    execute_smart_contract("sink", "record", "{\"amount\":\"1\"}");
};
"#;
        exec.deploy("bob", 2, Some(&deploy_payload("caller", caller)));

        let logs = exec.execute(
            "dave",
            3,
            "caller",
            "call",
            Some(r#"{"amountSTEEMSBD":"10","recipient":"erin"}"#),
        );
        let seen = logs.events.iter().find(|e| e.event == "seen").unwrap();
        assert_eq!(seen.data["amount"], "1");
        assert_eq!(seen.data["amountSTEEMSBD"], "10");
        assert_eq!(seen.data["recipient"], "erin");
    }

    #[test]
    fn create_ssc_cannot_be_reached_through_contract_calls() {
        let exec = executor();
        exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));

        let sneaky = r#"
actions.createSSC = |payload| {};

actions.sneak = |payload| {
    let result = execute_smart_contract("tok", "createSSC", "{}");
    emit("result", result);
};
"#;
        exec.deploy("bob", 2, Some(&deploy_payload("sneaky", sneaky)));
        let logs = exec.execute("bob", 3, "sneaky", "sneak", None);

        let result = logs.events.iter().find(|e| e.event == "result").unwrap();
        assert_eq!(
            result.data["errors"][0],
            "you cannot trigger the createSSC action"
        );
    }

    #[test]
    fn call_depth_is_bounded() {
        let exec = executor();
        let recursive = r#"
actions.createSSC = |payload| {};

actions.spin = |payload| {
    execute_smart_contract("loop", "spin", "{}");
};
"#;
        exec.deploy("alice", 1, Some(&deploy_payload("loop", recursive)));
        let logs = exec.execute("alice", 2, "loop", "spin", None);
        assert!(logs
            .errors
            .iter()
            .any(|e| e == "contract call depth limit reached"));
    }

    #[test]
    fn runtime_errors_are_recorded_not_thrown() {
        let exec = executor();
        let source = r#"
actions.createSSC = |payload| {};

actions.boom = |payload| {
    let x = payload.missing_field.deeper;
};
"#;
        exec.deploy("alice", 1, Some(&deploy_payload("bomb", source)));
        let logs = exec.execute("alice", 2, "bomb", "boom", None);
        assert_eq!(logs.errors.len(), 1);
        assert!(logs.errors[0].starts_with("RuntimeError:"), "{:?}", logs.errors);
    }

    #[test]
    fn runaway_contract_hits_the_operation_budget() {
        let exec = executor();
        let source = r#"
actions.createSSC = |payload| {};

actions.spin = |payload| {
    let n = 0;
    loop { n += 1; }
};
"#;
        exec.deploy("alice", 1, Some(&deploy_payload("hot", source)));
        let logs = exec.execute("alice", 2, "hot", "spin", None);
        assert_eq!(logs.errors.len(), 1);
        assert!(logs.errors[0].starts_with("TimeoutError:"), "{:?}", logs.errors);
    }

    #[test]
    fn currency_math_is_fixed_point() {
        let exec = executor();
        let source = r#"
actions.createSSC = |payload| {};

actions.sum = |payload| {
    emit("total", #{ value: currency::add(payload.a, payload.b, 3) });
};
"#;
        exec.deploy("alice", 1, Some(&deploy_payload("calc", source)));
        let logs = exec.execute(
            "alice",
            2,
            "calc",
            "sum",
            Some(r#"{"a":"0.1","b":"0.2"}"#),
        );
        assert!(logs.errors.is_empty(), "errors: {:?}", logs.errors);
        assert_eq!(logs.events[0].data["value"], "0.300");
    }

    #[test]
    fn execution_is_deterministic() {
        let run = || {
            let exec = executor();
            exec.deploy("alice", 1, Some(&deploy_payload("tok", TOKEN_SOURCE)));
            let logs = exec.execute("alice", 2, "tok", "mint", Some(r#"{"amount":"5"}"#));
            let rows = exec.database().all("tok_balances");
            (serde_json::to_string(&logs).unwrap(), serde_json::to_string(&rows).unwrap())
        };
        assert_eq!(run(), run());
    }
}
