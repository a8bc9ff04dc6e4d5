//! Codec round-trip and robustness tests
//!
//! Streams are built with the encoder and read back with the decoder, so
//! both directions of every schema are exercised against each other.

use apt_bytecode::{
    Arena, DecodeConfig, Decoder, Directive, FormatError, FunctionDefinition, Instruction, Opcode,
    PreloadFlags, Schema, Script, Value, decode, encode, encode_into,
};

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_cstr(bytes: &[u8], at: usize) -> &str {
    let len = bytes[at..].iter().position(|b| *b == 0).unwrap();
    std::str::from_utf8(&bytes[at..at + len]).unwrap()
}

/// Sample value for a value directive, retagged when `next` asks for it
fn sample_value(directive: Directive, next: Option<Directive>, n: i32) -> Option<Value> {
    let value = match directive {
        Directive::U8 => Value::Integer(0x7F - n),
        Directive::U16 => Value::Integer(0x1234 + n),
        Directive::U24 => Value::Integer(0x12_3456 + n),
        Directive::U32 => Value::Integer(-2 - n),
        Directive::I8 => Value::Integer(-5 - n),
        Directive::I16 => Value::Integer(-300 - n),
        Directive::I32 => Value::Integer(-70_000 - n),
        Directive::Float => Value::Float(1.5 + n as f64),
        Directive::Double => Value::Float(2.25 + n as f64),
        Directive::Boolean => Value::Boolean(n % 2 == 0),
        Directive::String => Value::string(format!("s{n}")),
        _ => return None,
    };
    match next {
        Some(Directive::Constant) => value.to_constant(),
        Some(Directive::Register) => value.to_register(),
        _ => Some(value),
    }
}

/// Parameters matching `schema`, with two records in any array
fn sample_params(schema: &Schema) -> Vec<Value> {
    let directives = schema.directives();
    let mut params = Vec::new();
    let mut index = 0;
    while index < directives.len() {
        let next = directives.get(index + 1).copied();
        match directives[index] {
            Directive::ArrayBegin => {
                let body = schema.array_body().unwrap();
                for n in 0..2 {
                    for i in body.clone() {
                        let next = directives.get(i + 1).copied();
                        params.extend(sample_value(directives[i], next, n));
                    }
                }
                index = body.end;
            }
            _ if next == Some(Directive::ArraySizeHidden) => {}
            _ if next == Some(Directive::ArraySize) => params.push(Value::Integer(2)),
            directive => params.extend(sample_value(directive, next, 0)),
        }
        index += 1;
    }
    params
}

fn sample_instruction(opcode: Opcode) -> Option<Instruction> {
    let schema = opcode.schema()?;
    let trailer = if schema.directives().contains(&Directive::Opaque64) {
        0x0123_4567_89AB_CDEF
    } else {
        0
    };
    Some(Instruction::new(opcode, sample_params(&schema)).with_trailer(trailer))
}

fn plain(positioned: Vec<(u64, Instruction)>) -> Vec<Instruction> {
    positioned.into_iter().map(|(_, i)| i).collect()
}

/// Opcodes whose parameter layout is unknown
const UNKNOWN_LAYOUTS: [Opcode; 6] = [
    Opcode::WaitForFrame,
    Opcode::WaitForFrameExpr,
    Opcode::Try,
    Opcode::With,
    Opcode::CallFrame,
    Opcode::Padding,
];

#[test]
fn test_roundtrip_every_opcode() {
    for &opcode in Opcode::ALL.iter().filter(|op| **op != Opcode::End) {
        if UNKNOWN_LAYOUTS.contains(&opcode) {
            assert!(opcode.schema().is_none(), "{opcode}");
            continue;
        }
        let instruction = sample_instruction(opcode).unwrap_or_else(|| panic!("{opcode}: no schema"));
        let stream = vec![instruction, Instruction::simple(Opcode::End)];

        let bytes = encode(&stream).unwrap_or_else(|e| panic!("{opcode}: {e}"));
        let decoded = decode(&bytes, 0).unwrap_or_else(|e| panic!("{opcode}: {e}"));
        assert_eq!(plain(decoded), stream, "{opcode}");
    }
}

#[test]
fn test_get_url2_is_parameterless() {
    let decoded = decode(&[0x9A, 0x00], 0).unwrap();
    assert_eq!(
        plain(decoded),
        vec![Instruction::simple(Opcode::GetUrl2), Instruction::simple(Opcode::End)]
    );

    let bytes = encode(&[
        Instruction::simple(Opcode::Play),
        Instruction::simple(Opcode::GetUrl2),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();
    assert_eq!(bytes, vec![0x06, 0x9A, 0x00]);
}

#[test]
fn test_alignment() {
    for &opcode in Opcode::ALL.iter().filter(|op| op.requires_alignment()) {
        let Some(instruction) = sample_instruction(opcode) else {
            continue;
        };
        let schema = opcode.schema().unwrap();
        // a leading no-arg instruction puts the opcode at offset 1
        let stream = vec![
            Instruction::simple(Opcode::Play),
            instruction,
            Instruction::simple(Opcode::End),
        ];
        let bytes = encode(&stream).unwrap();
        assert_eq!(bytes[1], opcode.to_byte());
        assert_eq!(&bytes[2..4], &[0, 0], "{opcode}");

        let decoded = decode(&bytes, 0).unwrap();
        assert_eq!(decoded[1].0, 1);
        assert_eq!(decoded[2].0, 4 + schema.inline_len() as u64, "{opcode}");
    }
}

#[test]
fn test_unaligned_parameters_follow_opcode() {
    let stream = vec![
        Instruction::simple(Opcode::Play),
        Instruction::new(Opcode::EaPushShort, vec![Value::Integer(-2)]),
        Instruction::simple(Opcode::End),
    ];
    let bytes = encode(&stream).unwrap();
    assert_eq!(&bytes[..5], &[0x06, 0xB6, 0xFE, 0xFF, 0x00]);
}

#[test]
fn test_frontier_scans_past_end() {
    let mut stream = vec![
        Instruction::branch(Opcode::BranchAlways, 40),
        Instruction::simple(Opcode::End),
    ];
    stream.extend(std::iter::repeat_n(Instruction::simple(Opcode::Play), 39));
    stream.push(Instruction::simple(Opcode::Stop));
    stream.push(Instruction::simple(Opcode::End));

    let bytes = encode(&stream).unwrap();
    let decoded = decode(&bytes, 0).unwrap();

    assert_eq!(decoded.len(), 43);
    assert_eq!(decoded[1], (8, Instruction::simple(Opcode::End)));
    assert_eq!(decoded[41], (48, Instruction::simple(Opcode::Stop)));
    assert_eq!(decoded[42].0, 49);
    assert_eq!(plain(decoded), stream);
}

#[test]
fn test_stops_at_first_end_without_branch() {
    let stream = vec![
        Instruction::simple(Opcode::Play),
        Instruction::simple(Opcode::End),
        Instruction::simple(Opcode::Stop),
        Instruction::simple(Opcode::End),
    ];
    let bytes = encode(&stream).unwrap();
    assert_eq!(decode(&bytes, 0).unwrap().len(), 2);
    // decoding from the middle
    assert_eq!(plain(decode(&bytes, 2).unwrap()), &stream[2..]);
}

#[test]
fn test_constant_pool_five_entries() {
    let pool = Instruction::constant_pool(10..15);
    let bytes = encode(&[pool.clone(), Instruction::simple(Opcode::End)]).unwrap();

    assert_eq!(bytes[0], 0x88);
    assert_eq!(read_u32(&bytes, 4), 5);
    let table = read_u32(&bytes, 8) as usize;
    assert_eq!(table % 4, 0);
    for (i, index) in (10u32..15).enumerate() {
        assert_eq!(read_u32(&bytes, table + 4 * i), index);
    }

    let decoded = decode(&bytes, 0).unwrap();
    assert_eq!(decoded[0].1, pool);
    assert_eq!(decoded[0].1.params.len(), 5);
    assert!(decoded[0].1.params.iter().all(|v| v.as_constant().is_some()));
}

#[test]
fn test_empty_array_writes_null_pointer() {
    let bytes = encode(&[
        Instruction::push_data([]),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();
    assert_eq!(read_u32(&bytes, 4), 0);
    assert_eq!(read_u32(&bytes, 8), 0);
    assert_eq!(bytes.len(), 13);

    let decoded = decode(&bytes, 0).unwrap();
    assert!(decoded[0].1.params.is_empty());
}

#[test]
fn test_goto_label_string_indirection() {
    let bytes = encode(&[
        Instruction::goto_label("start"),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();

    assert_eq!(bytes[0], 0x8C);
    let pointer = read_u32(&bytes, 4) as usize;
    assert_eq!(read_cstr(&bytes, pointer), "start");
    assert_eq!(bytes[pointer + 5], 0);

    let decoded = decode(&bytes, 0).unwrap();
    assert_eq!(decoded[0].1.params, vec![Value::string("start")]);
}

#[test]
fn test_strings_are_not_deduplicated() {
    let bytes = encode(&[
        Instruction::push_string("x"),
        Instruction::push_string("x"),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();
    assert_ne!(read_u32(&bytes, 4), read_u32(&bytes, 12));
}

#[test]
fn test_define_function2_roundtrip() {
    let definition = FunctionDefinition::builder()
        .name("onEnterFrame")
        .register_count(3)
        .flags(PreloadFlags::PRELOAD_THIS | PreloadFlags::SUPPRESS_SUPER)
        .register_param(1, "dx")
        .register_param(2, "dy")
        .body_length(17)
        .trailer(0xFFFF_0000_1234_5678)
        .build();
    let instruction = definition.to_instruction();

    let bytes = encode(&[instruction.clone(), Instruction::simple(Opcode::End)]).unwrap();
    // name, count, registers, flags (3 bytes), table, body length, trailer
    assert_eq!(read_u32(&bytes, 8), 2);
    assert_eq!(bytes[12], 3);
    assert_eq!(&bytes[13..16], &[0x00, 0x21, 0x00]);
    assert_eq!(&bytes[24..32], &0xFFFF_0000_1234_5678u64.to_le_bytes());

    let decoded = decode(&bytes, 0).unwrap();
    assert_eq!(decoded[0].1, instruction);
    assert_eq!(FunctionDefinition::try_from(&decoded[0].1).unwrap(), definition);
    assert_eq!(decoded[1].0, 32);
}

#[test]
fn test_define_function_roundtrip() {
    let definition = FunctionDefinition::builder()
        .name("max")
        .param("a")
        .param("b")
        .body_length(9)
        .build();
    let instruction = definition.to_instruction();

    let bytes = encode(&[instruction.clone(), Instruction::simple(Opcode::End)]).unwrap();
    let decoded = decode(&bytes, 0).unwrap();
    assert_eq!(decoded[0].1, instruction);
    assert_eq!(decoded[1].0, 28);
}

#[test]
fn test_reencode_is_byte_identical() {
    let stream = vec![
        Instruction::constant_pool(0..3),
        Instruction::push_data([2, 0]),
        Instruction::new(Opcode::EaPushConstantByte, vec![Value::ConstantRef(1)]),
        Instruction::new(Opcode::EaPushRegister, vec![Value::RegisterRef(4)]),
        Instruction::new(Opcode::EaPushFloat, vec![Value::Float(-0.25)]),
        Instruction::new(
            Opcode::GetUrl,
            vec![Value::string("http://example.com"), Value::string("_blank")],
        ),
        Instruction::branch(Opcode::BranchIfTrue, 0),
        Instruction::simple(Opcode::End),
    ];
    let first = encode(&stream).unwrap();
    let second = encode(&plain(decode(&first, 0).unwrap())).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_encode_into_embeds_stream() {
    let mut arena = Arena::new();
    let header = arena.allocate(6);
    let stream = encode_into(&mut arena, &[
        Instruction::goto_label("loop"),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();
    let address = arena.address(stream);
    arena.patch_u32(header, 0, address as u32).unwrap();
    let bytes = arena.finalize();

    assert_eq!(address, 8);
    let start = read_u32(&bytes, 0) as u64;
    let decoded = decode(&bytes, start).unwrap();
    assert_eq!(decoded[0].0, 8);
    assert_eq!(decoded[0].1, Instruction::goto_label("loop"));
}

#[test]
fn test_failed_encode_into_leaves_arena_unchanged() {
    let mut arena = Arena::new();
    let header = arena.allocate(6);
    let before = (arena.len(), arena.chunk_count());

    let result = encode_into(&mut arena, &[
        Instruction::push_string("kept"),
        Instruction::constant_pool(0..3),
        Instruction::new(Opcode::GotoFrame, vec![Value::Boolean(true)]),
    ]);
    assert!(matches!(result, Err(FormatError::TypeMismatch { .. })));
    assert_eq!((arena.len(), arena.chunk_count()), before);

    let stream = encode_into(&mut arena, &[Instruction::simple(Opcode::End)]).unwrap();
    arena.patch_u32(header, 0, arena.address(stream) as u32).unwrap();
    let bytes = arena.finalize();
    assert_eq!(bytes.len(), 9);
    assert_eq!(decode(&bytes, 8).unwrap(), vec![(8, Instruction::simple(Opcode::End))]);
}

#[test]
fn test_script_roundtrip() {
    let bytes = encode(&[
        Instruction::simple(Opcode::Play),
        Instruction::branch(Opcode::BranchAlways, -8),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();
    let script = Script::decode(&bytes, 0).unwrap();

    assert_eq!(script.position_by_index(1), Some(1));
    assert_eq!(script.index_by_position(8), Some(2));
    assert_eq!(script.encode().unwrap(), bytes);

    let restored = Script::from_json(&script.to_json().unwrap()).unwrap();
    assert_eq!(restored, script);
}

#[test]
fn test_branch_span_cap() {
    let bytes = encode(&[
        Instruction::branch(Opcode::BranchAlways, 1000),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();
    let decoder = Decoder::with_config(DecodeConfig {
        max_branch_span: 100,
        ..DecodeConfig::default()
    });
    assert!(matches!(
        decoder.decode(&bytes, 0),
        Err(FormatError::IterationCapExceeded { limit: 100 })
    ));
}

#[test]
fn test_instruction_cap() {
    let mut stream = vec![Instruction::simple(Opcode::Play); 10];
    stream.push(Instruction::simple(Opcode::End));
    let bytes = encode(&stream).unwrap();

    let decoder = Decoder::with_config(DecodeConfig {
        max_instructions: 5,
        ..DecodeConfig::default()
    });
    assert!(matches!(
        decoder.decode(&bytes, 0),
        Err(FormatError::IterationCapExceeded { limit: 5 })
    ));
    assert_eq!(decode(&bytes, 0).unwrap().len(), 11);
}

#[test]
fn test_frontier_past_buffer_is_bounds_error() {
    let bytes = encode(&[
        Instruction::branch(Opcode::BranchAlways, 64),
        Instruction::simple(Opcode::End),
    ])
    .unwrap();
    assert!(matches!(
        decode(&bytes, 0),
        Err(FormatError::BoundsExceeded { .. })
    ));
}

#[test]
fn test_decode_errors() {
    assert!(matches!(
        decode(&[0x01], 0),
        Err(FormatError::UnknownOpcode { byte: 0x01, offset: 0 })
    ));
    assert!(matches!(
        decode(&[0x06, 0x8A, 0, 0], 0),
        Err(FormatError::NoSchema(Opcode::WaitForFrame))
    ));
    // no End
    assert!(matches!(
        decode(&[0x06, 0x07], 0),
        Err(FormatError::BoundsExceeded { .. })
    ));
    // string pointer past the buffer
    assert!(matches!(
        decode(&[0x8C, 0, 0, 0, 0xFF, 0, 0, 0, 0x00], 0),
        Err(FormatError::BoundsExceeded { .. })
    ));
    assert!(matches!(
        decode(&[0x00], 5),
        Err(FormatError::BoundsExceeded { .. })
    ));
}

#[test]
fn test_invalid_utf8_string() {
    let mut bytes = vec![0xA1, 0, 0, 0, 12, 0, 0, 0, 0x00, 0, 0, 0];
    bytes.extend_from_slice(&[0xC3, 0x28, 0x00]);
    assert!(matches!(
        decode(&bytes, 0),
        Err(FormatError::InvalidString { offset: 12 })
    ));
}

#[test]
fn test_encoded_errors_leave_no_output() {
    let result = encode(&[
        Instruction::simple(Opcode::Play),
        Instruction::new(Opcode::GotoFrame, vec![Value::Boolean(true)]),
    ]);
    assert!(matches!(result, Err(FormatError::TypeMismatch { .. })));
}
