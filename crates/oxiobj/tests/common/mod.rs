// Common test utilities for integration tests
//
// Shared class builders and method implementations. Class names are unique
// per call because the registry is process-wide and tests run in parallel.

#![allow(dead_code)]

use oxiobj::runtime::{
    Class, Id, Selector, allocate_class_pair, register_class_pair,
};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_CLASS_ID: AtomicUsize = AtomicUsize::new(0);

/// Calls made to [`counter_impl`].
pub static COUNTER_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Teardown hooks run, across every class built with [`with_teardown`].
pub static TEARDOWN_CALLS: AtomicUsize = AtomicUsize::new(0);

/// A class name no other test has used.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", NEXT_CLASS_ID.fetch_add(1, Ordering::SeqCst))
}

/// Allocates and registers a class with no methods.
pub fn create_class(prefix: &str, superclass: Option<Class>) -> Class {
    let class = allocate_class_pair(superclass, &unique_name(prefix), 0)
        .expect("Failed to allocate test class");
    register_class_pair(class);
    class
}

/// Allocates a class, lets `build` add ivars and methods, then registers it.
pub fn create_class_with(
    prefix: &str,
    superclass: Option<Class>,
    build: impl FnOnce(Class),
) -> Class {
    let class = allocate_class_pair(superclass, &unique_name(prefix), 0)
        .expect("Failed to allocate test class");
    build(class);
    register_class_pair(class);
    class
}

/// Adds a `destroyIvars` hook counting into [`TEARDOWN_CALLS`].
pub fn with_teardown(class: Class) {
    class.add_method(selector("destroyIvars"), teardown_impl, "v@:");
}

pub fn selector(name: &str) -> Selector {
    Selector::register(name).expect("Failed to create test selector")
}

pub fn counter_impl(_receiver: Id, _selector: Selector, _args: &[usize]) -> usize {
    COUNTER_CALLS.fetch_add(1, Ordering::SeqCst) + 1
}

pub fn teardown_impl(_receiver: Id, _selector: Selector, _args: &[usize]) -> usize {
    TEARDOWN_CALLS.fetch_add(1, Ordering::SeqCst);
    0
}

pub fn return_1(_receiver: Id, _selector: Selector, _args: &[usize]) -> usize {
    1
}

pub fn return_2(_receiver: Id, _selector: Selector, _args: &[usize]) -> usize {
    2
}

pub fn return_42(_receiver: Id, _selector: Selector, _args: &[usize]) -> usize {
    42
}

pub fn return_100(_receiver: Id, _selector: Selector, _args: &[usize]) -> usize {
    100
}

pub fn sum_args(_receiver: Id, _selector: Selector, args: &[usize]) -> usize {
    args.iter().sum()
}
