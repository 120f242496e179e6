//! Universal invariants of the generator, checked on concrete chains.

mod common;

use std::collections::HashSet;

use chainforge_backend::instructions::Instruction;
use chainforge_backend::opt::{liveness, mem_region};
use chainforge_backend::{Generator, Ir, SymbolKind};
use chainforge_common::{Backend, GemmDescr, MatrixPool, Scalar};

use common::{context, single_gemm_chain, strided, two_gemm_chain};

fn generate_twice(
    chain: fn() -> (MatrixPool, Vec<GemmDescr>),
) -> (chainforge_backend::KernelArtifacts, chainforge_backend::KernelArtifacts) {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = chain();
    let first = Generator::new(&ctx, pool, gemms).unwrap().generate().unwrap();
    let (pool, gemms) = chain();
    let second = Generator::new(&ctx, pool, gemms).unwrap().generate().unwrap();
    (first, second)
}

#[test]
fn generation_is_deterministic() {
    for chain in [single_gemm_chain, two_gemm_chain] {
        let (first, second) = generate_twice(chain);
        assert_eq!(first.name, second.name);
        assert_eq!(first.kernel, second.kernel);
        assert_eq!(first.launcher, second.launcher);
        assert_eq!(first.header, second.header);
    }
}

#[test]
fn symbol_names_are_unique() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = two_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    generator.generate().unwrap();

    let names: Vec<&str> = generator
        .ir()
        .symbols
        .iter()
        .map(|(_, symbol)| symbol.name.as_str())
        .collect();
    let unique: HashSet<&str> = names.iter().copied().collect();
    assert_eq!(names.len(), unique.len());
}

#[test]
fn co_live_symbols_never_share_a_region() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = two_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    generator.generate().unwrap();

    let live_map = liveness::analyze(generator.ir());
    let regions = mem_region::allocate_regions(&live_map);
    for live in &live_map {
        for &a in live {
            for &b in live {
                if a != b {
                    assert_ne!(
                        mem_region::region_of(&regions, a),
                        mem_region::region_of(&regions, b)
                    );
                }
            }
        }
    }
}

#[test]
fn region_offsets_partition_the_backing_store() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = two_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    generator.generate().unwrap();

    let report = generator.report().unwrap();
    let mut expected_offset = 0;
    for (&offset, &size) in report.region_offsets.iter().zip(&report.region_sizes) {
        assert_eq!(offset, expected_offset);
        expected_offset += size;
        assert!(offset + size <= report.size_per_mult);
    }
    assert_eq!(expected_offset, report.size_per_mult);
}

/// For every write to a shared symbol followed by a gemm reading it with
/// no intervening write, a barrier must sit in between.
fn assert_sync_coverage(ir: &Ir) {
    let program = &ir.program;
    for (write_at, &write_id) in program.iter().enumerate() {
        let Some(written) = ir.instr(write_id).shr_mem_write_dest() else {
            continue;
        };
        let mut sync_seen = false;
        for &later_id in &program[write_at + 1..] {
            match ir.instr(later_id) {
                Instruction::SyncThreads(_) => sync_seen = true,
                Instruction::Gemm(gemm) => {
                    if gemm.op1 == written || gemm.op2 == written {
                        assert!(
                            sync_seen,
                            "read of a shared symbol without a barrier after its write"
                        );
                    }
                }
                instr => {
                    if instr.shr_mem_write_dest() == Some(written) {
                        break;
                    }
                }
            }
        }
    }
}

#[test]
fn every_shared_read_is_fenced_from_its_write() {
    let ctx = context("sm_60", Backend::Cuda);
    for chain in [single_gemm_chain, two_gemm_chain] {
        let (pool, gemms) = chain();
        let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
        generator.generate().unwrap();
        assert_sync_coverage(generator.ir());
    }
}

#[test]
fn every_emitted_instruction_is_ready() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = two_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    generator.generate().unwrap();

    let ir = generator.ir();
    for &id in &ir.program {
        assert!(ir.instr(id).is_ready(ir), "{}", ir.instr(id).descr(ir));
    }
    // Every operand of every scheduled instruction resolves to a named
    // symbol.
    for &id in &ir.program {
        let descr = ir.instr(id).descr(ir);
        assert!(!descr.contains("<unnamed>"));
    }
}

#[test]
fn runtime_scalars_lead_the_parameter_list() {
    let ctx = context("sm_60", Backend::Cuda);
    let mut pool = MatrixPool::new();
    let a = strided(&mut pool, 32, 32);
    let b = strided(&mut pool, 32, 32);
    let c = strided(&mut pool, 32, 32);
    let descr = GemmDescr::new(
        &mut pool,
        false,
        false,
        a,
        b,
        c,
        Scalar::from("alpha"),
        Scalar::from("beta"),
        false,
    )
    .unwrap();

    let artifacts = Generator::new(&ctx, pool, vec![descr]).unwrap().generate().unwrap();
    let header = &artifacts.header;

    let order = [
        "float alpha",
        "float beta",
        "float* A",
        "unsigned A_extraOffset",
        "float* B",
        "unsigned B_extraOffset",
        "float* C",
        "unsigned C_extraOffset",
        "size_t numElements",
        "unsigned* flags",
        "void* streamPtr",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|needle| header.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);

    // The kernel signature carries the scalars too; the launcher forwards
    // them first.
    assert!(artifacts.kernel.contains("float alpha, float beta, float* A"));
    assert!(artifacts.launcher.contains("(alpha, beta, A, A_extraOffset"));
}

#[test]
fn conservative_barriers_survive_when_the_pass_is_disabled() {
    use chainforge_common::{Context, FloatingPointType, Options};

    let options = Options { enable_sync_threads_opt: false, ..Options::default() };
    let ctx =
        Context::new("sm_60", Backend::Cuda, FloatingPointType::Float, options).unwrap();
    let (pool, gemms) = single_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    let artifacts = generator.generate().unwrap();

    // The builder brackets each gemm with three barriers; dead-tail
    // removal drops the trailing one, the rest stay.
    assert_eq!(artifacts.kernel.matches("__syncthreads();").count(), 2);
    assert_sync_coverage(generator.ir());
}

#[test]
fn global_batches_resolve_to_one_symbol_each() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = two_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    generator.generate().unwrap();

    let batch_count = generator
        .ir()
        .symbols
        .iter()
        .filter(|(_, symbol)| symbol.kind == SymbolKind::Batch)
        .count();
    // Four persistent matrices, one batch symbol each, despite repeated
    // appearances across the chain.
    assert_eq!(batch_count, 4);
}
