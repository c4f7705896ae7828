//! Integration tests for state creation, calls, writes and termination

use serpent_engine::{load_module, BridgeError, Map, Value};
use serpent_state::{call_method, Creator, SharedStates, StateRegistry};
use std::sync::Arc;

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/py");

fn config(class_name: &str, extra: &[(&str, Value)]) -> Map {
    let mut config = Map::new();
    config.insert("module_path".to_string(), Value::from(FIXTURES));
    config.insert("module_name".to_string(), Value::from("_test_creator_module"));
    config.insert("class_name".to_string(), Value::from(class_name));
    for (key, value) in extra {
        config.insert(key.to_string(), value.clone());
    }
    config
}

#[test]
fn test_create_with_required_values() {
    let state = Creator::new().create_state(&config("TestClass", &[])).unwrap();
    assert_eq!(state.params().module_name, "_test_creator_module");
    assert_eq!(state.params().class_name, "TestClass");
    assert!(!state.is_writable());
    assert!(state.args().is_empty());

    let registry = SharedStates::new();
    registry.add("creator_test", Arc::new(state)).unwrap();

    let result = call_method(&registry, "creator_test", "write", &[Value::from("test")]).unwrap();
    assert_eq!(result, Value::from(r#"called! arg is "test""#));

    let err = call_method(&registry, "creator_test", "not_exist_method", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::MethodNotFound(_)));

    registry.remove("creator_test").unwrap().terminate().unwrap();
}

#[test]
fn test_call_method_unknown_state() {
    let registry = SharedStates::new();
    let err = call_method(&registry, "nobody", "confirm", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::StateNotFound(ref name) if name == "nobody"));
}

#[test]
fn test_registry_rejects_duplicate_names() {
    let creator = Creator::new();
    let registry = SharedStates::new();
    let first = Arc::new(creator.create_state(&config("TestClass", &[])).unwrap());
    let second = Arc::new(creator.create_state(&config("TestClass", &[])).unwrap());

    registry.add("dup", first.clone()).unwrap();
    let err = registry.add("dup", second.clone()).unwrap_err();
    assert!(matches!(err, BridgeError::StateAlreadyExists(_)));
    assert_eq!(registry.count(), 1);
    assert_eq!(registry.names(), vec!["dup".to_string()]);

    registry.remove("dup");
    assert!(registry.get("dup").is_none());
    first.terminate().unwrap();
    second.terminate().unwrap();
}

#[test]
fn test_constructor_arguments() {
    let state = Creator::new()
        .create_state(&config(
            "TestClass2",
            &[("v1", Value::from("init_test")), ("v2", Value::from("init_test2"))],
        ))
        .unwrap();
    assert_eq!(
        state.call("confirm", &[]).unwrap(),
        Value::from("constructor init arg is v1=init_test, v2=init_test2")
    );
    state.terminate().unwrap();
}

#[test]
fn test_constructor_arguments_with_defaults() {
    let state = Creator::new()
        .create_state(&config("TestClass3", &[("a", Value::Int(55))]))
        .unwrap();
    assert_eq!(
        state.call("confirm", &[]).unwrap(),
        Value::from("constructor init arg is a=55, b=b, c={}")
    );
    state.terminate().unwrap();
}

#[test]
fn test_extra_constructor_arguments_are_keywords() {
    let state = Creator::new()
        .create_state(&config(
            "TestClass3",
            &[("a", Value::Int(1)), ("z", Value::Bool(true))],
        ))
        .unwrap();
    assert_eq!(
        state.call("confirm", &[]).unwrap(),
        Value::from("constructor init arg is a=1, b=b, c={'z': True}")
    );
    state.terminate().unwrap();
}

#[test]
fn test_missing_module_name() {
    let mut config = config("TestClass", &[]);
    config.remove("module_name");
    let err = Creator::new().create_state(&config).unwrap_err();
    assert!(matches!(err, BridgeError::MissingParameter(_)));
    assert!(err.to_string().contains("module_name"));
}

#[test]
fn test_missing_class_name() {
    let mut config = config("TestClass", &[]);
    config.remove("class_name");
    let err = Creator::new().create_state(&config).unwrap_err();
    assert!(err.to_string().contains("class_name"));
}

#[test]
fn test_unknown_module_and_class() {
    let mut bad_module = config("TestClass", &[]);
    bad_module.insert("module_name".to_string(), Value::from("no_such_module"));
    let err = Creator::new().create_state(&bad_module).unwrap_err();
    assert!(matches!(err, BridgeError::ModuleNotFound { .. }));

    let err = Creator::new()
        .create_state(&config("NoSuchClass", &[]))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ClassNotFound { .. }));
}

#[test]
fn test_constructor_exception() {
    let err = Creator::new()
        .create_state(&config("TestClass2", &[("v1", Value::from("only one"))]))
        .unwrap_err();
    match err {
        BridgeError::Construction { class, exception } => {
            assert_eq!(class, "TestClass2");
            assert_eq!(exception.type_name, "TypeError");
        }
        other => panic!("Expected Construction, got {:?}", other),
    }
}

#[test]
fn test_writable_state() {
    let state = Creator::new()
        .create_state(&config("TestClass", &[("write_method", Value::from("write"))]))
        .unwrap();
    assert!(state.is_writable());
    assert_eq!(state.params().write_method.as_deref(), Some("write"));
    assert!(state.args().is_empty());

    state.write(&Map::new()).unwrap();
    state.terminate().unwrap();
}

#[test]
fn test_write_passes_data_and_ignores_result() {
    let state = Creator::new()
        .create_state(&config("Sink", &[("write_method", Value::from("write"))]))
        .unwrap();

    let mut row = Map::new();
    row.insert("id".to_string(), Value::Int(7));
    row.insert("payload".to_string(), Value::Blob(vec![1, 2, 3]));
    state.write(&row).unwrap();
    state.write(&row).unwrap();

    assert_eq!(state.call("count", &[]).unwrap(), Value::Int(2));
    assert_eq!(state.call("last", &[]).unwrap(), Value::Map(row));
    state.terminate().unwrap();
}

#[test]
fn test_write_not_configured() {
    let state = Creator::new().create_state(&config("TestClass", &[])).unwrap();
    let err = state.write(&Map::new()).unwrap_err();
    assert!(matches!(err, BridgeError::WriteNotConfigured));
    state.terminate().unwrap();
}

#[test]
fn test_states_are_independent() {
    let creator = Creator::new();
    let a = creator
        .create_state(&config("TestClass4", &[("a", Value::Int(1)), ("b", Value::from("hoge"))]))
        .unwrap();
    let b = creator
        .create_state(&config("TestClass4", &[("a", Value::Int(1)), ("b", Value::from("hoge"))]))
        .unwrap();

    a.call("modify_params", &[]).unwrap();
    let mut untouched = Map::new();
    untouched.insert("a".to_string(), Value::Int(1));
    untouched.insert("b".to_string(), Value::from("hoge"));
    assert_eq!(b.call("confirm", &[]).unwrap(), Value::Map(untouched.clone()));
    assert_ne!(a.call("confirm", &[]).unwrap(), Value::Map(untouched));

    a.terminate().unwrap();
    b.terminate().unwrap();
}

#[test]
fn test_terminate_then_every_operation_fails() {
    let state = Creator::new()
        .create_state(&config("TestClass", &[("write_method", Value::from("write"))]))
        .unwrap();
    assert!(state.check_termination().is_ok());
    state.terminate().unwrap();

    assert!(state.is_terminated());
    assert!(state.check_termination().unwrap_err().is_already_terminated());
    assert!(matches!(state.terminate(), Err(BridgeError::AlreadyTerminated)));
    assert!(matches!(state.call("write", &[Value::Null]), Err(BridgeError::AlreadyTerminated)));
    assert!(matches!(state.write(&Map::new()), Err(BridgeError::AlreadyTerminated)));
    assert!(matches!(
        state.save(&mut Vec::new(), &Map::new()),
        Err(BridgeError::AlreadyTerminated)
    ));
    assert!(matches!(
        state.load(&mut &b""[..], &Map::new()),
        Err(BridgeError::AlreadyTerminated)
    ));
}

#[test]
fn test_terminated_state_without_write_method() {
    let state = Creator::new().create_state(&config("TestClass", &[])).unwrap();
    state.terminate().unwrap();
    assert!(matches!(state.write(&Map::new()), Err(BridgeError::AlreadyTerminated)));
}

#[test]
fn test_terminate_hook_runs_once() {
    let state = Creator::new()
        .create_state(&config(
            "RecordsTermination",
            &[("name", Value::from("hook_runs_once"))],
        ))
        .unwrap();
    state.terminate().unwrap();
    assert!(state.terminate().is_err());

    let module = load_module("_test_creator_module").unwrap();
    let count = module
        .call("terminated_count", &[Value::from("hook_runs_once")])
        .unwrap();
    assert_eq!(count, Value::Int(1));
    module.release();
}

#[test]
fn test_terminate_hook_raises() {
    let state = Creator::new()
        .create_state(&config("TestClassTerminateError", &[]))
        .unwrap();
    let err = state.terminate().unwrap_err();
    assert!(matches!(err, BridgeError::Termination { .. }));
    assert!(err.to_string().contains("ZeroDivisionError"));

    // Released anyway
    assert!(state.is_terminated());
    assert!(matches!(state.terminate(), Err(BridgeError::AlreadyTerminated)));
}

#[test]
fn test_terminate_hook_lookup_raises() {
    let state = Creator::new().create_state(&config("RaisingLookup", &[])).unwrap();
    let err = state.terminate().unwrap_err();
    match err {
        BridgeError::Termination { ref exception } => {
            assert_eq!(exception.type_name, "ZeroDivisionError");
            assert!(exception.message.contains("hook lookup"));
        }
        ref other => panic!("Expected Termination, got {:?}", other),
    }
    assert!(err.to_string().contains("ZeroDivisionError"));
    assert!(state.is_terminated());
}

#[test]
fn test_cyclic_result_is_conversion_error() {
    let state = Creator::new().create_state(&config("Cyclic", &[])).unwrap();
    let err = state.call("loop", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Conversion { .. }), "got {:?}", err);
    state.terminate().unwrap();
}

#[test]
fn test_write_method_exception_propagates() {
    let state = Creator::new()
        .create_state(&config("BrokenSink", &[("write_method", Value::from("write"))]))
        .unwrap();
    match state.write(&Map::new()).unwrap_err() {
        BridgeError::Invocation { method, exception } => {
            assert_eq!(method, "write");
            assert_eq!(exception.type_name, "ValueError");
            assert!(exception.message.contains("sink is full"));
        }
        other => panic!("Expected Invocation, got {:?}", other),
    }
    state.terminate().unwrap();
}

#[test]
fn test_shared_state_across_threads() {
    let state = Arc::new(
        Creator::new()
            .create_state(&config("Sink", &[("write_method", Value::from("write"))]))
            .unwrap(),
    );
    let threads: Vec<_> = (0..4)
        .map(|i| {
            let state = state.clone();
            std::thread::spawn(move || {
                for j in 0..25 {
                    let mut row = Map::new();
                    row.insert("n".to_string(), Value::Int(i * 100 + j));
                    state.write(&row).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(state.call("count", &[]).unwrap(), Value::Int(100));
    state.terminate().unwrap();
}
