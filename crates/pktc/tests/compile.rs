use pkt_schema::decl::ProtocolFile;
use pkt_schema::SchemaErrorKind;
use pktc::{CompiledSchema, ProtocolCompiler};
use serde_json::{json, Value};

fn compile(files: &[(&str, Value)]) -> Result<CompiledSchema, pkt_schema::SchemaError> {
    let mut compiler = ProtocolCompiler::new();
    for (source_path, value) in files {
        let decl: ProtocolFile =
            serde_json::from_value(value.clone()).expect("fixture must deserialize");
        compiler.index_file(source_path, decl)?;
    }
    compiler.compile()
}

fn compile_one(value: Value) -> Result<CompiledSchema, pkt_schema::SchemaError> {
    compile(&[("protocol", value)])
}

#[test]
fn type_names_are_global_across_files() {
    let mut compiler = ProtocolCompiler::new();
    let first: ProtocolFile = serde_json::from_value(json!({
        "structs": [{"name": "Coords", "instructions": [
            {"kind": "field", "name": "x", "type": "char"}
        ]}]
    }))
    .unwrap();
    let second: ProtocolFile = serde_json::from_value(json!({
        "structs": [{"name": "Coords", "instructions": []}]
    }))
    .unwrap();

    compiler.index_file("protocol", first).unwrap();
    let err = compiler.index_file("protocol/map", second).unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Type);
    assert!(err.message.contains("Coords"));
}

#[test]
fn duplicate_enum_ordinal_rejected() {
    let err = compile_one(json!({
        "enums": [{"name": "Element", "type": "char", "values": [
            {"name": "Fire", "value": 1},
            {"name": "Ice", "value": 1}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Type);
}

#[test]
fn optional_field_must_not_be_followed_by_required() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [
            {"kind": "field", "name": "a", "type": "char", "optional": true},
            {"kind": "field", "name": "b", "type": "char"}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
    assert!(err.message.contains("optional"));
}

#[test]
fn unbounded_element_forbidden_in_plain_array() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [
            {"kind": "array", "name": "names", "type": "string"}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
    assert!(err.message.contains("unbounded"));
}

#[test]
fn delimited_array_requires_chunked_section() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [
            {"kind": "array", "name": "items", "type": "short", "delimited": true}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
}

#[test]
fn trailing_delimiter_requires_delimited_array() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [
            {"kind": "array", "name": "items", "type": "short", "trailing_delimiter": false}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
    assert!(err.message.contains("trailing"));
}

#[test]
fn break_requires_chunked_section() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [{"kind": "break"}]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
}

#[test]
fn dummy_must_be_final_instruction() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [
            {"kind": "dummy", "type": "char", "value": 0},
            {"kind": "field", "name": "a", "type": "char"}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
}

#[test]
fn known_enum_ordinal_must_be_named_in_case() {
    let err = compile_one(json!({
        "enums": [{"name": "Kind", "type": "char", "values": [
            {"name": "One", "value": 1}
        ]}],
        "structs": [{"name": "Msg", "instructions": [
            {"kind": "field", "name": "kind", "type": "Kind"},
            {"kind": "switch", "field": "kind", "cases": [
                {"value": "1", "instructions": [
                    {"kind": "field", "name": "a", "type": "char"}
                ]}
            ]}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
    assert!(err.message.contains("must be referred to by name"));
}

#[test]
fn unknown_enum_ordinal_allowed_in_case() {
    let schema = compile_one(json!({
        "enums": [{"name": "Kind", "type": "char", "values": [
            {"name": "One", "value": 1}
        ]}],
        "structs": [{"name": "Msg", "instructions": [
            {"kind": "field", "name": "kind", "type": "Kind"},
            {"kind": "switch", "field": "kind", "cases": [
                {"value": "7", "instructions": [
                    {"kind": "field", "name": "a", "type": "char"}
                ]}
            ]}
        ]}]
    }))
    .unwrap();
    assert!(schema.objects.contains_key("MsgKindData7"));
}

#[test]
fn switch_discriminator_must_be_declared_first() {
    let err = compile_one(json!({
        "structs": [{"name": "Msg", "instructions": [
            {"kind": "switch", "field": "kind", "cases": []}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
    assert!(err.message.contains("not accessible"));
}

#[test]
fn length_field_must_not_be_shared() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [
            {"kind": "length", "name": "len", "type": "char"},
            {"kind": "field", "name": "a", "type": "string", "length": "len"},
            {"kind": "field", "name": "b", "type": "string", "length": "len"}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
    assert!(err.message.contains("multiple"));
}

#[test]
fn hardcoded_string_must_match_declared_length() {
    let err = compile_one(json!({
        "structs": [{"name": "Bad", "instructions": [
            {"kind": "field", "type": "string", "length": 4, "value": "abc"}
        ]}]
    }))
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Instruction);
}

#[test]
fn packets_need_a_recognized_namespace() {
    let err = compile(&[(
        "protocol/map",
        json!({
            "enums": [
                {"name": "PacketFamily", "type": "char", "values": [{"name": "Connection", "value": 1}]},
                {"name": "PacketAction", "type": "char", "values": [{"name": "Player", "value": 2}]}
            ],
            "packets": [{"family": "Connection", "action": "Player", "instructions": []}]
        }),
    )])
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Packet);
    assert!(err.message.contains("protocol/map"));
}

#[test]
fn packet_family_member_must_exist() {
    let err = compile(&[(
        "protocol/net/client",
        json!({
            "enums": [
                {"name": "PacketFamily", "type": "char", "values": [{"name": "Connection", "value": 1}]},
                {"name": "PacketAction", "type": "char", "values": [{"name": "Player", "value": 2}]}
            ],
            "packets": [{"family": "Warp", "action": "Player", "instructions": []}]
        }),
    )])
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Packet);
    assert!(err.message.contains("Warp"));
}

#[test]
fn duplicate_packet_identity_rejected_within_file() {
    let err = compile(&[(
        "protocol/net/client",
        json!({
            "enums": [
                {"name": "PacketFamily", "type": "char", "values": [{"name": "Connection", "value": 1}]},
                {"name": "PacketAction", "type": "char", "values": [{"name": "Player", "value": 2}]}
            ],
            "packets": [
                {"family": "Connection", "action": "Player", "instructions": []},
                {"family": "Connection", "action": "Player", "instructions": []}
            ]
        }),
    )])
    .unwrap_err();
    assert_eq!(err.kind, SchemaErrorKind::Packet);
}

#[test]
fn packet_names_derive_from_family_action_and_direction() {
    let schema = compile(&[
        (
            "protocol/net",
            json!({
                "enums": [
                    {"name": "PacketFamily", "type": "char", "values": [{"name": "Connection", "value": 1}]},
                    {"name": "PacketAction", "type": "char", "values": [{"name": "Player", "value": 2}]}
                ]
            }),
        ),
        (
            "protocol/net/client",
            json!({
                "packets": [{"family": "Connection", "action": "Player", "instructions": [
                    {"kind": "field", "name": "session_id", "type": "short"}
                ]}]
            }),
        ),
        (
            "protocol/net/server",
            json!({
                "packets": [{"family": "Connection", "action": "Player", "instructions": []}]
            }),
        ),
    ])
    .unwrap();

    let client = schema.packet("ConnectionPlayerClientPacket").unwrap();
    assert_eq!(client.family.ordinal, 1);
    assert_eq!(client.action.ordinal, 2);
    assert!(schema.packet("ConnectionPlayerServerPacket").is_some());
    assert!(schema.objects.contains_key("ConnectionPlayerClientPacket"));
}

#[test]
fn underlying_override_changes_enum_wire_size() {
    let schema = compile_one(json!({
        "enums": [{"name": "Big", "type": "short", "values": [
            {"name": "First", "value": 1}
        ]}],
        "structs": [{"name": "Holder", "instructions": [
            {"kind": "field", "name": "value", "type": "Big:char"}
        ]}]
    }))
    .unwrap();
    assert!(schema.objects.contains_key("Holder"));
}
