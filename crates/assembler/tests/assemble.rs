//! End-to-end assembly tests: whole sources through the pass driver,
//! checking the bytes that land in memory.

use std::io::Write;

use rasm::{Assembler, output};

fn assemble(source: &str) -> Assembler {
    let mut asm = Assembler::new();
    asm.assemble_str("test.asm", source).expect("assembly failed");
    asm
}

fn bytes(asm: &Assembler, bank: u32, addr: u32, count: u32) -> Vec<u8> {
    (0..count).map(|i| asm.ctx.memory.read(bank, addr + i)).collect()
}

#[test]
fn test_two_pass_forward_reference() {
    let asm = assemble(
        "      ORG 0x8000\n\
         \x20     JP later\n\
         \x20     NOP\n\
         later: LD A, 1\n",
    );

    assert_eq!(
        bytes(&asm, 0, 0x8000, 6),
        vec![0xc3, 0x04, 0x80, 0x00, 0x3e, 0x01]
    );
}

#[test]
fn test_local_label_scoping() {
    // Two independent locals named .l, each resolving within its own
    // global's body.
    let asm = assemble(
        "one: LD A, 1\n\
         .l:  JR .l\n\
         two: LD A, 2\n\
         .l:  JR .l\n",
    );

    assert_eq!(
        bytes(&asm, 0, 0, 8),
        vec![0x3e, 0x01, 0x18, 0xfe, 0x3e, 0x02, 0x18, 0xfe]
    );
}

#[test]
fn test_zero_page_auto_selection() {
    let asm = assemble(
        "      CPU 6502\n\
         label equ 0x10\n\
         \x20     LDA label\n\
         \x20     LDA 0x200\n",
    );

    assert_eq!(bytes(&asm, 0, 0, 5), vec![0xa5, 0x10, 0xad, 0x00, 0x02]);
}

#[test]
fn test_macro_with_named_parameters() {
    let asm = assemble(
        "MACRO push2 r1, r2\n\
         \x20 PUSH @r1\n\
         \x20 PUSH @r2\n\
         ENDM\n\
         \x20 push2 BC, DE\n",
    );

    assert_eq!(bytes(&asm, 0, 0, 2), vec![0xc5, 0xd5]);
}

#[test]
fn test_macro_positional_and_quoting() {
    // A (hl) argument re-expands with its parentheses, so the body
    // assembles the indirect form.
    let asm = assemble(
        "ldm: MACRO\n\
         \x20 LD A,\\1\n\
         ENDM\n\
         \x20 ldm (hl)\n\
         \x20 ldm 7\n",
    );

    assert_eq!(bytes(&asm, 0, 0, 3), vec![0x7e, 0x3e, 0x07]);
}

#[test]
fn test_macro_local_labels_are_scoped() {
    // The loop label lives in the invocation's own namespace, so the
    // macro can be expanded twice.
    let asm = assemble(
        "wait: MACRO n\n\
         \x20 LD B,@n\n\
         .lp: DJNZ .lp\n\
         ENDM\n\
         \x20 wait 2\n\
         \x20 wait 3\n",
    );

    assert_eq!(
        bytes(&asm, 0, 0, 8),
        vec![0x06, 0x02, 0x10, 0xfe, 0x06, 0x03, 0x10, 0xfe]
    );
}

#[test]
fn test_global_label_in_macro_rejected() {
    let mut asm = Assembler::new();
    let result = asm.assemble_str(
        "bad.asm",
        "m: MACRO\n\
         oops: NOP\n\
         ENDM\n\
         \x20 m\n",
    );
    assert!(result.is_err());
}

#[test]
fn test_equ_and_expressions() {
    let asm = assemble(
        "size  equ 0x10\n\
         \x20    DB size, size * 2, {size + 2} / 3\n\
         \x20    DW size << 8\n",
    );

    assert_eq!(bytes(&asm, 0, 0, 5), vec![0x10, 0x20, 0x06, 0x00, 0x10]);
}

#[test]
fn test_db_strings_and_dw() {
    let asm = assemble("  DB \"AB\", 0\n  DW 0x1234\n");
    assert_eq!(
        bytes(&asm, 0, 0, 5),
        vec![0x41, 0x42, 0x00, 0x34, 0x12]
    );
}

#[test]
fn test_ds_and_align() {
    let asm = assemble(
        "  ORG 1\n\
         \x20 DB 0xaa\n\
         \x20 ALIGN 4\n\
         \x20 DB 0xbb\n\
         \x20 DS 3, 0xcc\n",
    );

    // ALIGN without a fill moves the PC without writing.
    assert_eq!(asm.ctx.memory.read(0, 1), 0xaa);
    assert_eq!(asm.ctx.memory.read(0, 2), 0);
    assert_eq!(asm.ctx.memory.read(0, 4), 0xbb);
    assert_eq!(bytes(&asm, 0, 5, 3), vec![0xcc, 0xcc, 0xcc]);
}

#[test]
fn test_org_with_bank_and_bank_directive() {
    let asm = assemble(
        "  ORG 0x100, 2\n\
         \x20 DB 1\n\
         \x20 BANK 5\n\
         \x20 ORG 0x100\n\
         \x20 DB 2\n",
    );

    assert_eq!(asm.ctx.memory.read(2, 0x100), 1);
    assert_eq!(asm.ctx.memory.read(5, 0x100), 2);
    assert_eq!(asm.ctx.memory.used_banks(), vec![2, 5]);
}

#[test]
fn test_alias_rewrites_commands() {
    let asm = assemble("  ALIAS dfb db\n  dfb 0x7f\n");
    assert_eq!(asm.ctx.memory.read(0, 0), 0x7f);
}

#[test]
fn test_end_stops_assembly() {
    let asm = assemble("  DB 1\n  END\n  DB 2\n");
    assert_eq!(asm.ctx.memory.read(0, 0), 1);
    assert_eq!(asm.ctx.memory.read(0, 1), 0);
}

#[test]
fn test_dollar_is_line_start_pc() {
    let asm = assemble("  ORG 0x4000\nhere: DW $\n");
    assert_eq!(bytes(&asm, 0, 0x4000, 2), vec![0x00, 0x40]);
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let mut asm = Assembler::new();
    let result = asm.assemble_str("bad.asm", "  FNORD 1,2\n");
    let message = result.unwrap_err();
    assert!(message.contains("bad.asm:1"), "{message}");
    assert!(message.contains("FNORD"), "{message}");
}

#[test]
fn test_undefined_label_fails_on_final_pass() {
    let mut asm = Assembler::new();
    let result = asm.assemble_str("bad.asm", "  JP nowhere\n");
    assert!(result.is_err());
}

#[test]
fn test_include_files() {
    let dir = tempfile::tempdir().unwrap();
    let inc_path = dir.path().join("defs.asm");
    let mut inc = std::fs::File::create(&inc_path).unwrap();
    writeln!(inc, "value equ 0x42").unwrap();
    drop(inc);

    let main_path = dir.path().join("main.asm");
    let mut main = std::fs::File::create(&main_path).unwrap();
    writeln!(main, "  INCLUDE {}", inc_path.display()).unwrap();
    writeln!(main, "  DB value").unwrap();
    drop(main);

    let mut asm = Assembler::new();
    asm.assemble(&main_path).unwrap();
    assert_eq!(asm.ctx.memory.read(0, 0), 0x42);
}

#[test]
fn test_incbin() {
    let dir = tempfile::tempdir().unwrap();
    let bin_path = dir.path().join("blob.bin");
    std::fs::write(&bin_path, [1u8, 2, 3]).unwrap();

    let mut asm = Assembler::new();
    asm.assemble_str(
        "main.asm",
        &format!("  ORG 0x100\n  INCBIN {}\n", bin_path.display()),
    )
    .unwrap();

    assert_eq!(bytes(&asm, 0, 0x100, 3), vec![1, 2, 3]);
}

#[test]
fn test_cpu_switching_mid_source() {
    let asm = assemble(
        "  NOP\n\
         \x20 CPU 6502\n\
         \x20 SEI\n\
         \x20 CPU GAMEBOY\n\
         \x20 SWAP A\n",
    );

    assert_eq!(bytes(&asm, 0, 0, 4), vec![0x00, 0x78, 0xcb, 0x37]);
}

#[test]
fn test_library_round_trip_with_offset() {
    let dir = tempfile::tempdir().unwrap();
    let lib_path = dir.path().join("part.lib");

    // Assemble bank 0 with bytes 01 02 03 at 0x1000 and start=0x1000,
    // then emit as a library.
    let mut producer = Assembler::new();
    producer
        .assemble_str(
            "part.asm",
            "      ORG 0x1000\n\
             start: DB 1, 2, 3\n",
        )
        .unwrap();
    producer.ctx.output.file = lib_path.to_string_lossy().into_owned();
    producer.ctx.output.format = output::Format::Library;
    producer.write_output().unwrap();

    // Re-open at +0x100: bytes and the label both relocate.
    let mut consumer = Assembler::new();
    consumer
        .assemble_str(
            "main.asm",
            &format!("  IMPORT {}, 0x100\n  JP start\n", lib_path.display()),
        )
        .unwrap();

    assert_eq!(bytes(&consumer, 0, 0x1100, 3), vec![1, 2, 3]);
    assert_eq!(
        consumer
            .ctx
            .labels
            .find("start", rasm_core::LabelKind::Global)
            .unwrap()
            .value,
        0x1100
    );
    assert_eq!(bytes(&consumer, 0, 0, 3), vec![0xc3, 0x00, 0x11]);
}

#[test]
fn test_pc_advance_matches_bytes_written() {
    // new_pc - old_pc equals the bytes a line wrote.
    let mut asm = Assembler::new();
    asm.assemble_str("t.asm", "  ORG 0x9000\n  LD HL,0x1234\n")
        .unwrap();
    assert_eq!(asm.ctx.memory.pc(), 0x9003);
    assert_eq!(asm.ctx.memory.bank_span(0), Some((0x9000, 0x9002)));
}

#[test]
fn test_option_shorthand() {
    // OPTION +name / -name is yes/no shorthand; unknown options fail.
    let mut asm = Assembler::new();
    assert!(asm.assemble_str("t.asm", "  OPTION +list-pc\n").is_ok());

    let mut asm = Assembler::new();
    assert!(asm.assemble_str("t.asm", "  OPTION -no-such-option\n").is_err());
}

#[test]
fn test_spc700_direct_page_via_driver() {
    let asm = assemble(
        "  CPU SPC700\n\
         \x20 MOV A,#1\n\
         \x20 MOV 0x20,A\n",
    );

    assert_eq!(bytes(&asm, 0, 0, 4), vec![0xe8, 0x01, 0xc4, 0x20]);
}

#[test]
fn test_w65c816_wide_immediates_via_driver() {
    let asm = assemble(
        "  CPU 65c816\n\
         \x20 M16\n\
         \x20 LDA #0x1234\n",
    );

    assert_eq!(bytes(&asm, 0, 0, 3), vec![0xa9, 0x34, 0x12]);
}
