use super::*;
use proptest::prelude::*;

const GOTO: u8 = 0x04;

/// Reads a relative branch operand back; returns the displacement and the
/// record length.
fn decode_jump(bytes: &[u8]) -> (i32, usize) {
    let first = i32::from(bytes[1]);
    if first & 0x80 == 0 {
        ((first << 25) >> 25, 2)
    } else {
        let raw = ((first & 0x7f) << 8) | i32::from(bytes[2]);
        ((raw << 17) >> 17, 3)
    }
}

/// Checks every branch against the final layout of the stream.
fn check_displacements(stream: &ByteStream, base: i32) {
    let mut address = base;
    for chunk in stream.chunks() {
        match chunk {
            Chunk::Code(code) => address += code.len() as i32,
            Chunk::Target(t) => assert_eq!(address, stream.target_address(*t)),
            Chunk::Reloc(reloc) => {
                assert_eq!(address, reloc.address);
                if let RelocKind::Jump(opcode) = reloc.kind {
                    let (delta, len) = decode_jump(&reloc.bytes);
                    assert_eq!(opcode, reloc.bytes[0]);
                    assert_eq!(len, reloc.bytes.len());
                    let expected = stream.target_address(reloc.target) - (reloc.address + len as i32);
                    assert_eq!(expected, delta);
                }
                address += reloc.bytes.len() as i32;
            }
        }
    }
}

#[test]
fn test_short_forward_jump() {
    let mut stream = ByteStream::new();
    let end = stream.new_target();
    stream.jump(GOTO, end);
    stream.extend(&[0x35, 0x35, 0x35]);
    stream.place(end);
    stream.push(0x32);
    stream.fixup(0, 64).unwrap();
    assert_eq!(vec![GOTO, 3, 0x35, 0x35, 0x35, 0x32], stream.to_bytes());
}

#[test]
fn test_short_backward_jump() {
    let mut stream = ByteStream::new();
    let top = stream.new_target();
    stream.place(top);
    stream.push(0x35);
    stream.jump(GOTO, top);
    stream.fixup(0, 64).unwrap();
    // -3 in the seven-bit form
    assert_eq!(vec![0x35, GOTO, 0x7d], stream.to_bytes());
}

#[test]
fn test_jump_grows_past_63() {
    let mut stream = ByteStream::new();
    let end = stream.new_target();
    stream.jump(GOTO, end);
    stream.extend(&[0; 63]);
    stream.place(end);
    stream.fixup(0, 64).unwrap();
    let bytes = stream.to_bytes();
    assert_eq!(vec![GOTO, 0x80, 63], bytes[..3].to_vec());
    assert_eq!(66, bytes.len());
    check_displacements(&stream, 0);
}

#[test]
fn test_offset_push_uses_base() {
    let mut stream = ByteStream::new();
    let end = stream.new_target();
    stream.offset(end);
    stream.push(0x0f);
    stream.place(end);
    stream.fixup(0x40, 64).unwrap();
    // 0x40 + 3 fits the one-byte literal form
    assert_eq!(vec![0x38, 0x43, 0x0f], stream.to_bytes());
}

#[test]
fn test_string_offset_is_three_bytes() {
    let mut stream = ByteStream::new();
    let text = stream.new_target();
    stream.string_offset(text);
    stream.push(0x32);
    stream.place(text);
    stream.extend(b"hi\0");
    stream.fixup(0x108, 64).unwrap();
    assert_eq!(vec![STRING_PUSH, 0x81, 0x0c, 0x32, b'h', b'i', 0], stream.to_bytes());
}

#[test]
fn test_unplaced_target() {
    let mut stream = ByteStream::new();
    let nowhere = stream.new_target();
    stream.jump(GOTO, nowhere);
    let result = stream.fixup(0, 64);
    assert!(matches!(result, Err(InnerError::FixupDivergence(_))));
}

#[test]
fn test_iteration_limit() {
    let mut stream = ByteStream::new();
    let end = stream.new_target();
    stream.jump(GOTO, end);
    stream.extend(&[0; 100]);
    stream.place(end);
    // one round places, the next grows the branch; a single round can't settle
    let result = stream.fixup(0, 1);
    assert!(matches!(result, Err(InnerError::FixupDivergence(_))));
}

#[test]
fn test_encode_jump_offset() {
    assert_eq!(vec![0], encode_jump_offset(0, false));
    assert_eq!(vec![0x80, 63], encode_jump_offset(63, false));
    assert_eq!(vec![64], encode_jump_offset(-64, false));
    assert_eq!(vec![0xff, 0xbf], encode_jump_offset(-65, false));
    assert_eq!(vec![0x80, 5], encode_jump_offset(5, true));
}

proptest! {
    #[test]
    fn test_displacement_law(
        segments in prop::collection::vec((0usize..150, 0usize..4), 1..20),
        placements in prop::collection::vec(0usize..24, 4),
        base in 0i32..0x4000,
    ) {
        let mut stream = ByteStream::new();
        let targets: Vec<TargetId> = (0..placements.len()).map(|_| stream.new_target()).collect();
        for i in 0..=segments.len() {
            for (t, &at) in placements.iter().enumerate() {
                if at.min(segments.len()) == i {
                    stream.place(targets[t]);
                }
            }
            if let Some(&(code, t)) = segments.get(i) {
                stream.extend(&vec![0x35; code]);
                stream.jump(GOTO, targets[t]);
            }
        }
        stream.fixup(base, 64).unwrap();
        check_displacements(&stream, base);
        prop_assert_eq!(stream.len(), stream.to_bytes().len());
    }
}
