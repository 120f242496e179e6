//! The generator: build, optimize, emit.

use hashbrown::HashMap;
use md5::{Digest, Md5};
use tracing::debug;

use chainforge_common::aux::{block_id_2d, extra_offset_name};
use chainforge_common::lexicon;
use chainforge_common::{
    Context, Error, GemmDescr, GenerationError, InternalError, MatrixId, MatrixPool, Result,
    Scalar,
};

use crate::data_types::{RegMemId, ShrMemId};
use crate::instructions::builders::{KernelBuilder, KernelType};
use crate::ir::Ir;
use crate::opt::{OptSummary, OptimizationStage};
use crate::symbol::ObjectRef;
use crate::thread_block::{SimpleThreadBlockPolicy, ThreadBlockPolicy};
use crate::writer::Writer;

/// The three text artifacts of one kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelArtifacts {
    /// Device kernel source.
    pub kernel: String,
    /// Host launcher source.
    pub launcher: String,
    /// Header declaration of the launcher.
    pub header: String,
    /// Base name shared by kernel and launcher.
    pub name: String,
}

/// What the generator decided, for introspection and tests.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Threads covering one chain instance.
    pub num_threads: usize,
    /// Register-tile shape `(rows, cols)`.
    pub accumulator_size: (usize, usize),
    /// Shared-memory elements per chain instance.
    pub size_per_mult: usize,
    /// Chain instances per thread block.
    pub mults_per_block: usize,
    /// Number of shared-memory regions.
    pub num_regions: usize,
    /// Element size of each region.
    pub region_sizes: Vec<usize>,
    /// Element offset of each region.
    pub region_offsets: Vec<usize>,
    /// Symbol names of each region.
    pub region_members: Vec<Vec<String>>,
}

/// Translates one gemm chain into a kernel, a launcher, and a header.
///
/// All naming counters and the whole scope/instruction state are owned by
/// the generator instance, so concurrent generation of different kernels
/// stays independent.
pub struct Generator<'a> {
    context: &'a Context,
    pool: MatrixPool,
    gemm_list: Vec<GemmDescr>,
    kernel_type: KernelType,
    policy: Box<dyn ThreadBlockPolicy + 'a>,
    base_name: Option<String>,
    ir: Ir,
    matrix_order: Vec<MatrixId>,
    tmp_list: Vec<MatrixId>,
    num_threads: usize,
    accumulator: (usize, usize),
    reg_obj: Option<RegMemId>,
    shr_obj: Option<ShrMemId>,
    is_registered: bool,
    report: Option<GenerationReport>,
}

impl<'a> Generator<'a> {
    const NAME_ENCODING_LENGTH: usize = 10;

    /// A generator over `gemm_list`, taking ownership of the matrix pool.
    ///
    /// Fails when the list is empty or its strictness disagrees with the
    /// user options.
    pub fn new(
        context: &'a Context,
        pool: MatrixPool,
        gemm_list: Vec<GemmDescr>,
    ) -> Result<Self> {
        if gemm_list.is_empty() {
            return Err(Error::Generation(GenerationError::EmptyGemmList));
        }
        for gemm in &gemm_list {
            if gemm.is_strict_math() != context.user_options().exact_contraction_length {
                return Err(Error::Generation(GenerationError::InconsistentOptions {
                    strict_match: gemm.is_strict_math(),
                    exact_contraction_length: context.user_options().exact_contraction_length,
                }));
            }
        }

        let mut generator = Generator {
            context,
            pool,
            gemm_list,
            kernel_type: KernelType::Auto,
            policy: Box::new(SimpleThreadBlockPolicy),
            base_name: None,
            ir: Ir::new(),
            matrix_order: Vec::new(),
            tmp_list: Vec::new(),
            num_threads: 0,
            accumulator: (0, 0),
            reg_obj: None,
            shr_obj: None,
            is_registered: false,
            report: None,
        };
        generator.name_operands();
        Ok(generator)
    }

    /// Select the kernel flavor; `Auto` by default.
    #[must_use]
    pub fn with_kernel_type(mut self, kernel_type: KernelType) -> Self {
        self.kernel_type = kernel_type;
        self
    }

    /// Replace the thread-block occupancy policy.
    #[must_use]
    pub fn with_thread_block_policy(
        mut self,
        policy: Box<dyn ThreadBlockPolicy + 'a>,
    ) -> Self {
        self.policy = policy;
        self
    }

    /// Override the derived kernel name.
    pub fn set_kernel_name(&mut self, name: impl Into<String>) {
        self.base_name = Some(name.into());
    }

    /// The kernel base name; `None` before registration.
    pub fn base_name(&self) -> Option<&str> {
        self.base_name.as_deref()
    }

    /// The generation report; `None` before [`generate`](Self::generate).
    pub fn report(&self) -> Option<&GenerationReport> {
        self.report.as_ref()
    }

    /// The lowered program, for inspection after generation.
    pub fn ir(&self) -> &Ir {
        &self.ir
    }

    /// The matrix pool with generator-assigned names.
    pub fn pool(&self) -> &MatrixPool {
        &self.pool
    }

    /// The register-tile object, once the kernel builder ran.
    pub fn reg_obj(&self) -> Option<RegMemId> {
        self.reg_obj
    }

    /// Collect temporaries, populate the global scope, and derive the
    /// kernel name.
    pub fn register(&mut self) {
        self.collect_tmp_matrices();
        self.populate_global_scope();
        if self.base_name.is_none() {
            self.base_name = Some(self.generate_kernel_name());
        }
        self.is_registered = true;
    }

    /// Run the full pipeline and return the artifacts.
    pub fn generate(&mut self) -> Result<KernelArtifacts> {
        if !self.is_registered {
            self.register();
        }

        self.emit_ir()?;
        debug!(instrs = self.ir.program.len(), "ir emitted");

        let shr_obj = self.shr_obj.ok_or(InternalError::UnboundResult)?;
        let opt = OptimizationStage::new(self.context, shr_obj, self.num_threads);
        let summary = opt.optimize(&mut self.ir)?;

        self.deduce_mults_per_block(shr_obj)?;
        self.report = Some(self.make_report(shr_obj, &summary)?);

        let kernel = self.generate_kernel()?;
        let launcher = self.generate_launcher()?;
        let header = self.generate_header()?;
        let name = self.base_name.clone().ok_or(GenerationError::NotRegistered)?;
        debug!(%name, "artifacts generated");

        Ok(KernelArtifacts { kernel, launcher, header, name })
    }

    fn emit_ir(&mut self) -> Result<()> {
        let mut builder =
            KernelBuilder::new(self.context, &self.pool, &self.gemm_list, self.kernel_type);
        builder.build(&mut self.ir)?;
        self.num_threads = builder.num_threads();
        self.accumulator = builder.accumulator_size();
        self.reg_obj = builder.reg_obj();
        self.shr_obj = builder.shr_obj();
        self.kernel_type = builder.selected_kernel_type();
        Ok(())
    }

    fn deduce_mults_per_block(&mut self, shr_obj: ShrMemId) -> Result<()> {
        let size_per_mult = self.ir.shr_objects[shr_obj.index()]
            .size_per_mult()
            .ok_or(InternalError::UnboundResult)?;
        let mults = self
            .policy
            .num_mults_per_block(self.context.vm(), size_per_mult, self.num_threads);
        self.ir.shr_objects[shr_obj.index()].set_mults_per_block(mults);
        Ok(())
    }

    fn make_report(&self, shr_obj: ShrMemId, summary: &OptSummary) -> Result<GenerationReport> {
        let obj = &self.ir.shr_objects[shr_obj.index()];
        Ok(GenerationReport {
            num_threads: self.num_threads,
            accumulator_size: self.accumulator,
            size_per_mult: obj.size_per_mult().ok_or(InternalError::UnboundResult)?,
            mults_per_block: obj.mults_per_block().ok_or(InternalError::UnboundResult)?,
            num_regions: summary.regions.len(),
            region_sizes: summary.region_sizes.clone(),
            region_offsets: summary.region_offsets.clone(),
            region_members: summary
                .regions
                .iter()
                .map(|region| {
                    region
                        .symbols
                        .iter()
                        .map(|&symbol| self.ir.symbols[symbol].name.clone())
                        .collect()
                })
                .collect(),
        })
    }

    // Operand naming: persistent matrices get `A`, `B`, ... in order of
    // first appearance, temporaries `tmp0`, `tmp1`, ...

    fn name_operands(&mut self) {
        self.matrix_order = self
            .gemm_list
            .iter()
            .flat_map(|gemm| [gemm.mat_a, gemm.mat_b, gemm.mat_c])
            .collect();

        for &id in &self.matrix_order {
            self.pool[id].clear_name();
        }

        let mut tmp_counter = 0usize;
        let mut op_counter = b'A';
        for &id in &self.matrix_order {
            if self.pool[id].name().is_none() {
                if self.pool[id].is_tmp() {
                    self.pool[id].set_name(format!("tmp{tmp_counter}"));
                    tmp_counter += 1;
                } else {
                    self.pool[id].set_name((op_counter as char).to_string());
                    op_counter += 1;
                }
            }
        }
    }

    fn collect_tmp_matrices(&mut self) {
        self.tmp_list.clear();
        for &id in &self.matrix_order {
            if self.pool[id].is_tmp() && !self.tmp_list.contains(&id) {
                self.tmp_list.push(id);
            }
        }
    }

    fn populate_global_scope(&mut self) {
        for &id in &self.matrix_order {
            if !self.tmp_list.contains(&id) {
                let name = self.pool[id].name().unwrap_or_default().to_string();
                self.ir.add_to_global(name, ObjectRef::Matrix(id));
            }
        }
    }

    fn generate_kernel_name(&self) -> String {
        let mut long_name: Vec<String> = self
            .global_matrices()
            .map(|id| self.pool[id].gen_descr())
            .collect();
        for gemm in &self.gemm_list {
            long_name.push(gemm.alpha.to_string());
            long_name.push(gemm.beta.to_string());
            long_name.push(gemm.trans_a.to_string());
            long_name.push(gemm.trans_b.to_string());
        }

        let digest = Md5::digest(long_name.join(", ").as_bytes());
        let encoding = hex::encode(digest);
        format!("cf_gemms_{}", &encoding[..Self::NAME_ENCODING_LENGTH])
    }

    fn global_matrices(&self) -> impl Iterator<Item = MatrixId> + '_ {
        self.ir.scopes.global().iter().filter_map(|&(obj, _)| match obj {
            ObjectRef::Matrix(id) => Some(id),
            _ => None,
        })
    }

    // Parameter lists. Order: scalars (when runtime-valued), then each
    // global symbol's (pointer, extra offset) pair in insertion order, then
    // the batch count, the flags, and - on the launcher - the stream.

    fn scalar_params(&self, with_types: bool) -> Vec<String> {
        let mut params = Vec::new();
        let Some(last_gemm) = self.gemm_list.last() else {
            return params;
        };
        for scalar in [&last_gemm.alpha, &last_gemm.beta] {
            if let Scalar::Param(name) = scalar {
                params.push(self.typed(with_types, self.context.fp_as_str(), name, ""));
            }
        }
        params
    }

    fn base_params(&self, with_types: bool, with_defaults: bool) -> Vec<String> {
        let mut params = Vec::new();
        for id in self.global_matrices() {
            let matrix = &self.pool[id];
            let name = matrix.name().unwrap_or_default();
            let batch_type = format!("{}{}", self.context.fp_as_str(), matrix.addressing().ptr_type());
            params.push(self.typed(with_types, &batch_type, name, ""));
            params.push(self.typed(with_types, "unsigned", &extra_offset_name(name), ""));
        }
        params.push(self.typed(with_types, "size_t", lexicon::NUM_ELEMENTS, ""));
        let flags_default = if with_defaults { " = nullptr" } else { "" };
        params.push(self.typed(with_types, "unsigned*", lexicon::FLAGS, flags_default));
        params
    }

    #[allow(clippy::unused_self)]
    fn typed(&self, with_types: bool, ty: &str, name: &str, default: &str) -> String {
        if with_types {
            format!("{ty} {name}{default}")
        } else {
            name.to_string()
        }
    }

    fn kernel_proto(&self) -> Result<String> {
        let name = self.base_name.as_deref().ok_or(GenerationError::NotRegistered)?;
        let mut params = self.scalar_params(true);
        params.extend(self.base_params(true, false));
        let params = params.join(", ");

        let mults = self.mults_per_block()?;
        let lexic = &self.context.vm().lexic;
        let launch_bounds = lexic.launch_bounds(self.num_threads * mults);
        let tokens: Vec<&str> = [lexic.kernel_type, launch_bounds.as_str()]
            .into_iter()
            .filter(|token| !token.is_empty())
            .collect();
        Ok(format!("{} kernel_{name}({params})", tokens.join(" ")))
    }

    fn launcher_proto(&self, with_defaults: bool) -> Result<String> {
        let name = self.base_name.as_deref().ok_or(GenerationError::NotRegistered)?;
        let mut params = self.scalar_params(true);
        params.extend(self.base_params(true, with_defaults));
        let stream_default = if with_defaults { " = nullptr" } else { "" };
        params.push(format!("void* {}{stream_default}", lexicon::STREAM_PTR));
        Ok(format!("void launcher_{name}({})", params.join(", ")))
    }

    fn mults_per_block(&self) -> Result<usize> {
        let shr_obj = self.shr_obj.ok_or(InternalError::UnboundResult)?;
        self.ir.shr_objects[shr_obj.index()]
            .mults_per_block()
            .ok_or_else(|| InternalError::UnboundResult.into())
    }

    fn write_kernel_meta_data(&self, writer: &mut Writer) {
        writer.line("// meta data:");
        for id in self.global_matrices() {
            writer.line(format!("// {}", self.pool[id].gen_descr()));
        }
        writer.new_line();
        for gemm in &self.gemm_list {
            writer.line(format!("// {}", gemm.equation(&self.pool)));
        }
        writer.new_line();
    }

    fn generate_kernel(&self) -> Result<String> {
        let mut writer = Writer::new();
        let proto = self.kernel_proto()?;
        let batch_id = lexicon::BATCH_ID;

        writer.block(&proto, |writer| -> Result<()> {
            self.write_kernel_meta_data(writer);
            writer.line(format!(
                "unsigned {batch_id} = {};",
                block_id_2d(self.context.vm())
            ));
            writer.block(
                &format!("if ({batch_id} < {})", lexicon::NUM_ELEMENTS),
                |writer| -> Result<()> {
                    let flags = lexicon::FLAGS;
                    writer.block(
                        &format!("if ({flags} == nullptr || {flags}[{batch_id}] != 0)"),
                        |writer| -> Result<()> {
                            for &id in &self.ir.program {
                                let instr = self.ir.instr(id);
                                if !instr.is_ready(&self.ir) {
                                    return Err(Error::Generation(GenerationError::NotReady(
                                        instr.descr(&self.ir),
                                    )));
                                }
                                instr.render(self.context, &self.pool, &self.ir, writer)?;
                            }
                            Ok(())
                        },
                    )
                },
            )
        })?;
        Ok(writer.into_src())
    }

    fn generate_launcher(&self) -> Result<String> {
        let name = self.base_name.as_deref().ok_or(GenerationError::NotRegistered)?;
        let mults = self.mults_per_block()?;
        let lexic = &self.context.vm().lexic;

        let mut writer = Writer::new();
        writer.block(&self.launcher_proto(false)?, |writer| {
            writer.line(format!(
                "{} block({}, {mults}, 1);",
                lexic.dim3_type, self.num_threads
            ));
            writer.line(format!(
                "{} grid(({} + {mults} - 1) / {mults}, 1, 1);",
                lexic.dim3_type,
                lexicon::NUM_ELEMENTS
            ));
            writer.line(format!(
                "{stream_t} stream = ({ptr} != nullptr) ? static_cast<{stream_t}>({ptr}) : 0;",
                stream_t = lexic.stream_type,
                ptr = lexicon::STREAM_PTR
            ));

            let mut args = self.scalar_params(false);
            args.extend(self.base_params(false, false));
            let call_site = lexic.launch_code(
                &format!("kernel_{name}"),
                "grid",
                "block",
                "stream",
                &args.join(", "),
            );
            writer.line(format!("{call_site};"));
            writer.line("CHECK_ERR;");
        });
        Ok(writer.into_src())
    }

    fn generate_header(&self) -> Result<String> {
        Ok(format!("{};\n", self.launcher_proto(true)?))
    }

    /// A launcher invocation using matrix aliases where present, with
    /// default `flags` and `streamPtr` arguments.
    pub fn default_call_site(&self) -> Result<String> {
        if !self.is_registered {
            return Err(Error::Generation(GenerationError::NotRegistered));
        }
        let name = self.base_name.as_deref().ok_or(GenerationError::NotRegistered)?;

        let mut args = self.scalar_params(false);
        for id in self.global_matrices() {
            let matrix = &self.pool[id];
            let arg_name = matrix.alias().or(matrix.name()).unwrap_or_default().to_string();
            args.push(arg_name.clone());
            args.push(extra_offset_name(&arg_name));
        }
        args.push(lexicon::NUM_ELEMENTS.to_string());
        args.push(lexicon::FLAGS.to_string());
        args.push(lexicon::STREAM_PTR.to_string());
        Ok(format!("launcher_{name}({});", args.join(", ")))
    }

    /// A launcher invocation with caller-provided argument spellings,
    /// looked up by matrix alias.
    #[allow(clippy::too_many_arguments)]
    pub fn call_site(
        &self,
        mat_name_map: &HashMap<String, String>,
        offset_name_map: &HashMap<String, String>,
        alpha: Option<&str>,
        beta: Option<&str>,
        num_elements: &str,
        flags: Option<&str>,
        stream: Option<&str>,
    ) -> Result<String> {
        if !self.is_registered {
            return Err(Error::Generation(GenerationError::NotRegistered));
        }
        let name = self.base_name.as_deref().ok_or(GenerationError::NotRegistered)?;

        let mut args: Vec<String> = [alpha, beta]
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        for id in self.global_matrices() {
            if let Some(alias) = self.pool[id].alias() {
                if let (Some(mat), Some(offset)) =
                    (mat_name_map.get(alias), offset_name_map.get(alias))
                {
                    args.push(mat.clone());
                    args.push(offset.clone());
                }
            }
        }
        args.push(num_elements.to_string());
        args.extend(flags.map(str::to_string));
        args.extend(stream.map(str::to_string));
        Ok(format!("launcher_{name}({});", args.join(", ")))
    }
}
