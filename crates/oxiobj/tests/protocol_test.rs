//! Integration tests for protocols and class conformance.

mod common;

use common::{create_class, create_class_with, return_1, selector, unique_name};
use oxiobj::Error;
use oxiobj::runtime::Protocol;
use std::thread;

fn protocol(prefix: &str, base: Option<Protocol>) -> Protocol {
    Protocol::new(&unique_name(prefix), base).unwrap()
}

#[test]
fn test_adoption_by_class() {
    let copying = protocol("ProtoCopying", None);
    let class = create_class("ProtoAdopter", None);

    class.add_protocol(copying).unwrap();
    assert!(class.conforms_to(copying));
    assert_eq!(class.protocols(), vec![copying]);
    assert!(matches!(
        class.add_protocol(copying),
        Err(Error::ProtocolAlreadyAdopted { .. })
    ));
}

#[test]
fn test_conformance_is_inherited() {
    let base_protocol = protocol("ProtoInheritBase", None);
    let refined = protocol("ProtoInheritRefined", Some(base_protocol));
    let unrelated = protocol("ProtoInheritOther", None);

    let base = create_class("ProtoInheritClass", None);
    base.add_protocol(refined).unwrap();
    let derived = create_class("ProtoInheritSubclass", Some(base));

    assert!(derived.conforms_to(refined));
    assert!(derived.conforms_to(base_protocol));
    assert!(!derived.conforms_to(unrelated));
    assert!(derived.metaclass().conforms_to(refined));
    assert_eq!(derived.protocols(), vec![refined]);
}

#[test]
fn test_conformance_through_adopted_protocols() {
    let equatable = protocol("ProtoEquatable", None);
    let hashable = protocol("ProtoHashable", None);
    hashable.adopt(equatable).unwrap();

    let class = create_class("ProtoHashableClass", None);
    class.add_protocol(hashable).unwrap();
    assert!(class.conforms_to(equatable));
}

#[test]
fn test_validate_conformance() {
    let required = selector("protoRequired");
    let inherited = selector("protoInheritedRequired");
    let base_protocol = protocol("ProtoValidateBase", None);
    base_protocol.add_required(inherited, "v@:").unwrap();
    let checked = protocol("ProtoValidate", Some(base_protocol));
    checked.add_required(required, "v@:").unwrap();
    checked.add_optional(selector("protoOptional"), "v@:").unwrap();

    let partial = create_class_with("ProtoPartial", None, |class| {
        class.add_method(required, return_1, "v@:");
    });
    assert_eq!(
        partial.validate_protocol_conformance(checked),
        Err(Error::MissingProtocolMethod {
            protocol: checked.name().to_string(),
            selector: inherited.name().to_string(),
        })
    );

    let complete = create_class_with("ProtoComplete", Some(partial), |class| {
        class.add_method(inherited, return_1, "v@:");
    });
    assert_eq!(complete.validate_protocol_conformance(checked), Ok(()));
}

#[test]
fn test_concurrent_registration_of_one_name() {
    let name = unique_name("ProtoRace");
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let name = name.clone();
            thread::spawn(move || Protocol::new(&name, None).is_ok())
        })
        .collect();

    let created = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|created| *created)
        .count();
    assert_eq!(created, 1);
    assert!(Protocol::lookup(&name).is_some());
}
