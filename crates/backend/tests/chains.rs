//! Multi-gemm chains: temporaries, load reuse, and the store collapse.

mod common;

use chainforge_backend::instructions::Instruction;
use chainforge_backend::Generator;
use chainforge_common::Backend;

use common::{context, count_occurrences, gemm, strided, tmp, two_gemm_chain};

#[test]
fn fused_chain_collapses_the_final_read_modify_write() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = two_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    let artifacts = generator.generate().unwrap();

    // Internally the chain reads `D = C x (A x B) + D`: the first gemm's
    // operands are named A and B, the big multiplier C, the result D.
    // Only B is loaded; the straight global operands A and C stay put.
    assert_eq!(count_occurrences(&artifacts.kernel, "// loading glb"), 1);
    assert!(artifacts.kernel.contains("// loading glbB to _0: # no trans, extended"));
    assert!(!artifacts.kernel.contains("// loading glbA"));
    assert!(!artifacts.kernel.contains("// loading glbC"));

    // The temporary product lands in shared memory.
    assert!(artifacts.kernel.contains("// writing to shr mem: from reg0 to _1"));

    // beta = 1 on the final gemm: the collapse preloads `1.0 * D` and the
    // emitted store carries no `+ beta * D` term.
    assert!(artifacts.kernel.contains("// loading 1.0 * glbD to reg0"));
    assert!(artifacts.kernel.contains("= 1.0 * reg0[0][n];"));
    assert!(!artifacts.kernel.contains("+ 1.0 * glbD["));

    // The preload replaced the only register clear that survives
    // dead-tail removal.
    assert!(!artifacts.kernel.contains("// clear registers"));

    let ir = generator.ir();
    let load_position = ir
        .program
        .iter()
        .position(|&id| matches!(ir.instr(id), Instruction::LoadGlbToReg(_)))
        .expect("collapse must introduce a preload");
    let store_position = ir
        .program
        .iter()
        .rposition(|&id| matches!(ir.instr(id), Instruction::StoreRegToGlb(_)))
        .expect("final store must survive");
    assert!(load_position < store_position);
    if let Instruction::StoreRegToGlb(store) = ir.instr(ir.program[store_position]) {
        assert!(store.beta.is_zero());
    }
}

#[test]
fn chain_shares_one_region_between_operand_and_temporary() {
    let ctx = context("sm_60", Backend::Cuda);
    let (pool, gemms) = two_gemm_chain();
    let mut generator = Generator::new(&ctx, pool, gemms).unwrap();
    generator.generate().unwrap();

    // B's patch dies before the temporary is written, so both alias one
    // region.
    let report = generator.report().unwrap();
    assert_eq!(report.num_regions, 1);
    assert_eq!(report.region_members, vec![vec!["_0".to_string(), "_1".to_string()]]);
    // The temporary patch dominates: 9 columns times 64 aligned rows.
    assert_eq!(report.size_per_mult, 576);
}

#[test]
fn reused_operand_is_reloaded_transposed_in_a_fresh_scope() {
    let ctx = context("sm_60", Backend::Cuda);
    let mut pool = chainforge_common::MatrixPool::new();
    let x1 = strided(&mut pool, 32, 32);
    let x2 = strided(&mut pool, 32, 32);
    let product = tmp(&mut pool, 32, 32);
    let result = strided(&mut pool, 32, 32);

    // First gemm reads the reused matrix straight (as op2), the second
    // transposed (as op1).
    let first = gemm(&mut pool, false, false, x1, x2, product, 1.0, 0.0);
    let second = gemm(&mut pool, true, false, x2, product, result, 1.0, 0.0);

    let mut generator = Generator::new(&ctx, pool, vec![first, second]).unwrap();
    let artifacts = generator.generate().unwrap();

    // The straight patch `_0` cannot serve the transposed read: a fresh
    // transposed load `_2` appears, and the gemm consumes it rather than
    // falling back to global memory.
    assert!(artifacts.kernel.contains("// loading glbB to _0: # no trans, extended"));
    assert!(artifacts.kernel.contains("// loading glbB to _2: # trans, extended"));
    assert!(artifacts.kernel.contains("// gemm: _2 x _1"));
    assert!(!artifacts.kernel.contains("// gemm: glbB x"));

    // The reload lives in a scope of its own.
    assert!(generator.ir().scopes.num_scopes() > 3);

    // Transposed destination rows pad to the next prime above 32.
    assert!(artifacts.kernel.contains("* 37 + index / 32"));
}
