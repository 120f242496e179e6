//! Per-backend source vocabulary.

use super::Backend;

/// Backend-specific spellings used while rendering kernels and launchers.
#[derive(Debug, Clone)]
pub struct Lexic {
    /// `threadIdx.x` or its HIP equivalent.
    pub thread_idx_x: &'static str,
    /// `threadIdx.y` or its HIP equivalent.
    pub thread_idx_y: &'static str,
    /// `threadIdx.z` or its HIP equivalent.
    pub thread_idx_z: &'static str,
    /// `blockDim.x` or its HIP equivalent.
    pub block_dim_x: &'static str,
    /// `blockDim.y` or its HIP equivalent.
    pub block_dim_y: &'static str,
    /// `blockDim.z` or its HIP equivalent.
    pub block_dim_z: &'static str,
    /// `blockIdx.x` or its HIP equivalent.
    pub block_idx_x: &'static str,
    /// Stream type of the runtime API.
    pub stream_type: &'static str,
    /// Kernel qualifier and return type.
    pub kernel_type: &'static str,
    /// Shared-memory storage keyword.
    pub shr_mem_kw: &'static str,
    /// Grid/block dimension type.
    pub dim3_type: &'static str,
    /// Block-wide barrier.
    pub sync_block_threads: &'static str,
    /// Warp-scoped barrier; on HIP this is the block-wide one.
    pub sync_warp_threads: &'static str,
    /// Restrict qualifier.
    pub restrict_kw: &'static str,
    backend: Backend,
}

impl Lexic {
    /// The lexicon of the given backend.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        match backend {
            Backend::Cuda => Lexic {
                thread_idx_x: "threadIdx.x",
                thread_idx_y: "threadIdx.y",
                thread_idx_z: "threadIdx.z",
                block_dim_x: "blockDim.x",
                block_dim_y: "blockDim.y",
                block_dim_z: "blockDim.z",
                block_idx_x: "blockIdx.x",
                stream_type: "cudaStream_t",
                kernel_type: "__global__ void",
                shr_mem_kw: "__shared__",
                dim3_type: "dim3",
                sync_block_threads: "__syncthreads()",
                sync_warp_threads: "__syncwarp()",
                restrict_kw: "__restrict__",
                backend,
            },
            Backend::Hip => Lexic {
                thread_idx_x: "hipThreadIdx_x",
                thread_idx_y: "hipThreadIdx_y",
                thread_idx_z: "hipThreadIdx_z",
                block_dim_x: "hipBlockDim_x",
                block_dim_y: "hipBlockDim_y",
                block_dim_z: "hipBlockDim_z",
                block_idx_x: "hipBlockIdx_x",
                stream_type: "hipStream_t",
                kernel_type: "__global__ void",
                shr_mem_kw: "__shared__",
                dim3_type: "dim3",
                sync_block_threads: "__syncthreads()",
                sync_warp_threads: "__syncthreads()",
                restrict_kw: "__restrict__",
                backend,
            },
        }
    }

    /// The backend this lexicon spells for.
    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// The kernel invocation statement of the backend.
    #[must_use]
    pub fn launch_code(
        &self,
        func_name: &str,
        grid: &str,
        block: &str,
        stream: &str,
        func_params: &str,
    ) -> String {
        match self.backend {
            Backend::Cuda => {
                format!("{func_name}<<<{grid}, {block}, 0, {stream}>>>({func_params})")
            }
            Backend::Hip => {
                format!("hipLaunchKernelGGL({func_name}, {grid}, {block}, 0, {stream}, {func_params})")
            }
        }
    }

    /// The launch-bounds attribute, empty on backends without one.
    #[must_use]
    pub fn launch_bounds(&self, total_num_threads_per_block: usize) -> String {
        match self.backend {
            Backend::Cuda => format!("__launch_bounds__({total_num_threads_per_block})"),
            Backend::Hip => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hip_warp_sync_falls_back_to_block_sync() {
        let lexic = Lexic::new(Backend::Hip);
        assert_eq!(lexic.sync_warp_threads, "__syncthreads()");
        assert_eq!(lexic.launch_bounds(128), "");
    }

    #[test]
    fn launch_code_uses_backend_syntax() {
        let cuda = Lexic::new(Backend::Cuda);
        assert_eq!(
            cuda.launch_code("kernel_x", "grid", "block", "stream", "a, b"),
            "kernel_x<<<grid, block, 0, stream>>>(a, b)"
        );

        let hip = Lexic::new(Backend::Hip);
        assert_eq!(
            hip.launch_code("kernel_x", "grid", "block", "stream", "a, b"),
            "hipLaunchKernelGGL(kernel_x, grid, block, 0, stream, a, b)"
        );
    }
}
