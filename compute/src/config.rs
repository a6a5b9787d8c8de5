//! Strategy thresholds for the algorithm dispatcher.
//!
//! The defaults were tuned for older device generations; every one of them
//! can be overridden through the builder or the environment.

use bon::bon;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

static GLOBAL: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::from_env()));

/// Sizes at which algorithms switch strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Below this many elements CPU-class devices run `count_if`/`find_if`
    /// as one serial work-item.
    pub cpu_serial_threshold: usize,
    /// Below this many elements GPU-class devices run `count_if`/`find_if`
    /// as one serial work-item.
    pub gpu_serial_threshold: usize,
    /// Largest input sorted by the single work-item insertion sort.
    pub insertion_sort_threshold: usize,
    /// Work-group size of the tree reduction and the block scan.
    pub block_size: usize,
    /// Elements per counting block of a radix sort pass.
    pub radix_block_size: usize,
    /// Largest input `merge_sort_on_cpu` sorts as one block.
    pub merge_sort_threshold: usize,
    /// Run length produced by the block insertion sort before merging.
    pub merge_sort_block_size: usize,
    /// Below this many elements `min_element`/`max_element` run serially.
    pub extrema_serial_threshold: usize,
    /// Probe points per `binary_find` round.
    pub binary_find_threads: usize,
    /// Range size at which `binary_find` hands over to `find_if`.
    pub binary_find_threshold: usize,
    /// Output elements merged by one work-item.
    pub merge_tile_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[bon]
impl Config {
    #[builder]
    pub fn builder(
        #[builder(default = 1024)] cpu_serial_threshold: usize,
        #[builder(default = 32)] gpu_serial_threshold: usize,
        #[builder(default = 32)] insertion_sort_threshold: usize,
        #[builder(default = 256)] block_size: usize,
        #[builder(default = 128)] radix_block_size: usize,
        #[builder(default = 512)] merge_sort_threshold: usize,
        #[builder(default = 64)] merge_sort_block_size: usize,
        #[builder(default = 64)] extrema_serial_threshold: usize,
        #[builder(default = 128)] binary_find_threads: usize,
        #[builder(default = 128)] binary_find_threshold: usize,
        #[builder(default = 128)] merge_tile_size: usize,
    ) -> Self {
        Self {
            cpu_serial_threshold,
            gpu_serial_threshold,
            insertion_sort_threshold,
            block_size: block_size.max(2),
            radix_block_size: radix_block_size.max(1),
            merge_sort_threshold,
            merge_sort_block_size: merge_sort_block_size.max(1),
            extrema_serial_threshold,
            // Probe spacing divides by `threads - 1`.
            binary_find_threads: binary_find_threads.max(2),
            binary_find_threshold: binary_find_threshold.max(1),
            merge_tile_size: merge_tile_size.max(1),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `TESSERA_CPU_SERIAL_THRESHOLD` - Serial cutoff on CPU devices (default: 1024)
    /// * `TESSERA_GPU_SERIAL_THRESHOLD` - Serial cutoff on GPU devices (default: 32)
    /// * `TESSERA_INSERTION_SORT_THRESHOLD` - Insertion sort cutoff (default: 32)
    /// * `TESSERA_BLOCK_SIZE` - Reduction and scan work-group size (default: 256)
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<usize> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        let defaults = Self::default();
        Self::builder()
            .cpu_serial_threshold(var("TESSERA_CPU_SERIAL_THRESHOLD").unwrap_or(defaults.cpu_serial_threshold))
            .gpu_serial_threshold(var("TESSERA_GPU_SERIAL_THRESHOLD").unwrap_or(defaults.gpu_serial_threshold))
            .insertion_sort_threshold(
                var("TESSERA_INSERTION_SORT_THRESHOLD").unwrap_or(defaults.insertion_sort_threshold),
            )
            .block_size(var("TESSERA_BLOCK_SIZE").unwrap_or(defaults.block_size))
            .build()
    }

    /// Configuration the algorithms consult, read from the environment on first use.
    pub fn global() -> Config {
        *GLOBAL.read()
    }

    /// Replace the configuration the algorithms consult.
    pub fn set_global(config: Config) {
        *GLOBAL.write() = config;
    }
}
