//! Deterministic local placeholder generation.
//!
//! Used whenever the inference service is unavailable so the queue,
//! workers, and API layers stay fully exercisable without the external
//! dependency. Identical prompts produce identical gradient images, and
//! the step/progress pacing follows the same contract as a real
//! generation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use image::{Rgba, RgbaImage};
use rand::Rng;
use uuid::Uuid;

use darkroom_core::types::{GenerationRequest, GenerationResult};
use darkroom_core::CoreError;

use crate::ProgressFn;

/// Pause per simulated diffusion step.
const STEP_DELAY: Duration = Duration::from_millis(50);

/// Fold a prompt into a deterministic hash for gradient colors.
///
/// The same polynomial fold the rest of the platform has always used;
/// changing it would silently change every placeholder image.
fn prompt_hash(prompt: &str) -> i64 {
    let mut hash: i64 = 0;
    for ch in prompt.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as i64);
    }
    hash
}

/// Render the placeholder gradient for a prompt at the given size.
///
/// A vertical gradient between a color derived from the prompt hash and
/// its complement. Pure function: identical inputs yield identical
/// pixels.
pub fn placeholder_image(width: u32, height: u32, prompt: &str) -> RgbaImage {
    let hash = prompt_hash(prompt);

    let r1 = ((hash >> 16) & 0xFF) as u8;
    let g1 = ((hash >> 8) & 0xFF) as u8;
    let b1 = (hash & 0xFF) as u8;

    let r2 = 255 - r1;
    let g2 = 255 - g1;
    let b2 = 255 - b1;

    let mut img = RgbaImage::new(width, height);
    for y in 0..height {
        let t = y as f64 / height as f64;
        let r = (r1 as f64 * (1.0 - t) + r2 as f64 * t) as u8;
        let g = (g1 as f64 * (1.0 - t) + g2 as f64 * t) as u8;
        let b = (b1 as f64 * (1.0 - t) + b2 as f64 * t) as u8;
        for x in 0..width {
            img.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }
    img
}

/// Placeholder generator writing gradient PNGs to the output directory.
pub struct MockGenerator {
    output_dir: PathBuf,
    step_delay: Duration,
}

impl MockGenerator {
    /// Create a generator writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            step_delay: STEP_DELAY,
        }
    }

    /// Override the per-step pacing delay (tests).
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Produce `batch_size` placeholder results, pacing progress through
    /// the full step count.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &ProgressFn,
    ) -> Result<Vec<GenerationResult>, CoreError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let base_seed = resolve_seed(request.seed);
        let mut results = Vec::with_capacity(request.batch_size as usize);

        for index in 0..request.batch_size {
            for step in 1..=request.steps {
                tokio::time::sleep(self.step_delay).await;
                let pct = step as f64 / request.steps as f64 * 100.0;
                progress(pct, step);
            }

            let filename = format!("mock_{}_{index}.png", Uuid::new_v4());
            let path = self.output_dir.join(&filename);
            write_png(&path, placeholder_image(request.width, request.height, &request.prompt))?;

            results.push(GenerationResult {
                image_path: path.to_string_lossy().into_owned(),
                image_url: format!("/outputs/{filename}"),
                seed: base_seed.saturating_add(index as i64),
                width: request.width,
                height: request.height,
                metadata: mock_metadata(request),
            });
        }

        tracing::info!(job_id = %request.id, "Placeholder generation completed");
        Ok(results)
    }
}

/// Resolve a requested seed, drawing a random one for `-1`.
pub fn resolve_seed(seed: i64) -> i64 {
    if seed < 0 {
        rand::rng().random_range(0..i64::MAX)
    } else {
        seed
    }
}

fn write_png(path: &Path, img: RgbaImage) -> Result<(), CoreError> {
    img.save(path)
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))
}

fn mock_metadata(request: &GenerationRequest) -> HashMap<String, String> {
    HashMap::from([
        ("prompt".to_string(), request.prompt.clone()),
        ("negative".to_string(), request.negative_prompt.clone()),
        ("steps".to_string(), request.steps.to_string()),
        ("cfg_scale".to_string(), format!("{:.1}", request.cfg_scale)),
        ("sampler".to_string(), request.sampler.clone()),
        ("model".to_string(), request.model.clone()),
        ("generated_at".to_string(), Utc::now().to_rfc3339()),
        ("mock".to_string(), "true".to_string()),
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
