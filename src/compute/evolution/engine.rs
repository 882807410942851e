//! Background evolution engine.
//!
//! One worker thread runs the generational loop while the caller keeps full
//! control through `&self` methods. Fitness evaluation within a generation is
//! spread over a rayon pool. Pause and cancellation are cooperative flags
//! polled between generations and between evaluation batches.
//!
//! Lock order: `worker`, then `breeder`, then `snapshot`. The worker thread
//! only ever takes `snapshot`, `parameters` and the callback slots.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::schema::{
    EngineState, EvolutionParameters, EvolutionStats, Genome, ParameterError, StopReason,
};

use super::fitness::FitnessEvaluator;
use super::genome::GenomeRng;
use super::search::Breeder;

/// Callback invoked on the worker thread after every generation.
pub type GenerationCallback = Arc<dyn Fn(u32, &EvolutionStats) + Send + Sync>;

/// Callback invoked on the worker thread when a new high-water genome appears.
pub type BestFoundCallback = Arc<dyn Fn(&Genome, f32) + Send + Sync>;

/// Sleep between flag checks while paused.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Evaluation batch size per pool thread.
const BATCH_PER_THREAD: usize = 2;

/// Global mutation rate applied to seeded copies after the first.
const SEED_MUTATION_RATE: f32 = 0.5;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Population and statistics, always updated together.
#[derive(Debug, Default)]
struct Snapshot {
    population: Vec<Genome>,
    stats: EvolutionStats,
    /// Fitness values in `population` came from the current parameters.
    evaluated: bool,
    /// Replacement population picked up by the worker at the next generation.
    pending: Option<Vec<Genome>>,
}

/// State shared between the engine handle and its worker.
struct Shared {
    snapshot: Mutex<Snapshot>,
    parameters: RwLock<EvolutionParameters>,
    running: AtomicBool,
    paused: AtomicBool,
    cancelled: AtomicBool,
    worker_id: Mutex<Option<ThreadId>>,
    generation_callback: RwLock<Option<GenerationCallback>>,
    best_found_callback: RwLock<Option<BestFoundCallback>>,
}

impl Shared {
    fn parameters(&self) -> EvolutionParameters {
        self.parameters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Block while paused. Returns `false` once cancelled.
    fn wait_while_paused(&self) -> bool {
        while self.paused.load(Ordering::Acquire) {
            if self.is_cancelled() {
                return false;
            }
            thread::sleep(PAUSE_POLL);
        }
        !self.is_cancelled()
    }
}

/// Evolutionary search over deformable fractals, run on a background thread.
pub struct EvolutionEngine {
    shared: Arc<Shared>,
    /// Search state while no worker owns it.
    breeder: Mutex<Option<Breeder>>,
    worker: Mutex<Option<JoinHandle<Breeder>>>,
    seeding_rng: Mutex<GenomeRng>,
}

impl Default for EvolutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EvolutionEngine {
    /// Create an idle engine with default parameters and no population.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                snapshot: Mutex::new(Snapshot::default()),
                parameters: RwLock::new(EvolutionParameters::default()),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                cancelled: AtomicBool::new(false),
                worker_id: Mutex::new(None),
                generation_callback: RwLock::new(None),
                best_found_callback: RwLock::new(None),
            }),
            breeder: Mutex::new(None),
            worker: Mutex::new(None),
            seeding_rng: Mutex::new(GenomeRng::new(0)),
        }
    }

    /// Create an idle engine with validated parameters.
    pub fn with_parameters(parameters: EvolutionParameters) -> Result<Self, ParameterError> {
        let engine = Self::new();
        engine.set_parameters(parameters)?;
        Ok(engine)
    }

    /// Seed a fresh random population.
    ///
    /// Stops any running worker first. The engine is left idle with
    /// generation counter zero.
    pub fn initialize(&self, seed: u32) {
        self.stop_evolution();

        let params = self.shared.parameters();
        let mut breeder = Breeder::new(u64::from(seed), &params);
        let population = breeder.initial_population(params.population_size);

        {
            let mut breeder_slot = lock(&self.breeder);
            let mut snapshot = lock(&self.shared.snapshot);
            *snapshot = Snapshot {
                population,
                stats: EvolutionStats {
                    current_mutation_rate: breeder.mutation_rate(&params),
                    ..Default::default()
                },
                evaluated: false,
                pending: None,
            };
            *breeder_slot = Some(breeder);
        }
        *lock(&self.seeding_rng) = GenomeRng::new(u64::from(seed).wrapping_add(1));

        log::info!(
            "Initialized population of {} with seed {}",
            params.population_size,
            seed
        );
    }

    /// Spawn the worker. No-op while already running.
    ///
    /// An empty engine is initialized with seed 0 first; an existing
    /// population (seeded or imported) is evolved as is.
    pub fn start_evolution(&self) {
        if self.shared.running.load(Ordering::Acquire) {
            log::debug!("Evolution already running");
            return;
        }

        let mut worker = lock(&self.worker);
        if self.shared.running.load(Ordering::Acquire) {
            return;
        }
        self.reclaim_worker(&mut worker);

        let is_empty = lock(&self.shared.snapshot).population.is_empty();
        if is_empty {
            drop(worker);
            self.initialize(0);
            worker = lock(&self.worker);
        }

        let params = self.shared.parameters();
        let breeder = lock(&self.breeder)
            .take()
            .unwrap_or_else(|| Breeder::new(0, &params));

        lock(&self.shared.snapshot).stats.stop_reason = None;
        self.shared.cancelled.store(false, Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("evolution".into())
            .spawn(move || run_worker(shared, breeder));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                log::info!("Evolution started");
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                log::error!("Failed to spawn evolution worker: {err}");
            }
        }
    }

    /// Cancel the worker and wait for it to exit. Safe in any state.
    ///
    /// Called from a callback on the worker thread, this only requests
    /// cancellation; the worker exits after the callback returns.
    pub fn stop_evolution(&self) {
        self.shared.cancelled.store(true, Ordering::Release);

        let on_worker = *lock(&self.shared.worker_id) == Some(thread::current().id());
        if on_worker {
            return;
        }

        let mut worker = lock(&self.worker);
        self.shared.paused.store(false, Ordering::Release);
        if worker.is_some() {
            self.reclaim_worker(&mut worker);
            log::info!("Evolution stopped");
        }
        self.shared.running.store(false, Ordering::Release);
    }

    /// Hold the worker at the next generation boundary or batch check.
    ///
    /// Once this returns, no further generation is published until
    /// [`EvolutionEngine::resume_evolution`].
    pub fn pause_evolution(&self) {
        let _snapshot = lock(&self.shared.snapshot);
        if self.shared.running.load(Ordering::Acquire) {
            self.shared.paused.store(true, Ordering::Release);
            log::info!("Evolution paused");
        }
    }

    pub fn resume_evolution(&self) {
        if self.shared.paused.swap(false, Ordering::AcqRel) {
            log::info!("Evolution resumed");
        }
    }

    /// Whether a worker is alive, paused or not.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.is_running() && self.shared.paused.load(Ordering::Acquire)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        if self.is_running() {
            if self.is_paused() {
                EngineState::Paused
            } else {
                EngineState::Running
            }
        } else if lock(&self.shared.snapshot).stats.stop_reason.is_some() {
            EngineState::Stopped
        } else {
            EngineState::Idle
        }
    }

    /// Copy of the most recently published population.
    pub fn current_generation(&self) -> Vec<Genome> {
        lock(&self.shared.snapshot).population.clone()
    }

    /// Fittest genome, or `Genome::default()` for an empty population.
    pub fn best_individual(&self) -> Genome {
        lock(&self.shared.snapshot)
            .population
            .iter()
            .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
            .cloned()
            .unwrap_or_default()
    }

    /// Up to `n` genomes in descending fitness order.
    pub fn best_individuals(&self, n: usize) -> Vec<Genome> {
        let mut population = self.current_generation();
        population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        population.truncate(n);
        population
    }

    pub fn stats(&self) -> EvolutionStats {
        lock(&self.shared.snapshot).stats.clone()
    }

    /// Replace the parameters. Invalid sets are rejected and change nothing.
    ///
    /// A running worker picks up the new values at its next generation;
    /// `thread_count` applies from the next start.
    pub fn set_parameters(&self, parameters: EvolutionParameters) -> Result<(), ParameterError> {
        if let Err(err) = parameters.validate() {
            log::warn!("Rejected evolution parameters: {err}");
            return Err(err);
        }
        *self
            .shared
            .parameters
            .write()
            .unwrap_or_else(PoisonError::into_inner) = parameters;
        Ok(())
    }

    pub fn parameters(&self) -> EvolutionParameters {
        self.shared.parameters()
    }

    pub fn set_generation_callback<F>(&self, callback: F)
    where
        F: Fn(u32, &EvolutionStats) + Send + Sync + 'static,
    {
        *self
            .shared
            .generation_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn set_best_found_callback<F>(&self, callback: F)
    where
        F: Fn(&Genome, f32) + Send + Sync + 'static,
    {
        *self
            .shared
            .best_found_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Replace the population.
    ///
    /// Imported genes are clamped into their bounds and the population is
    /// truncated or padded with random genomes to the configured size. While
    /// running, the worker adopts the population at its next generation.
    pub fn import_population(&self, population: Vec<Genome>) {
        let imported = population.len();
        let population = self.fit_to_size(population.into_iter().map(sanitize).collect());
        log::info!("Importing population of {imported} as {}", population.len());
        self.replace_population(population);
    }

    /// Copy of the current population, including fitness values.
    pub fn export_population(&self) -> Vec<Genome> {
        self.current_generation()
    }

    /// Place `copies` copies of `genome` at the tail of the population.
    ///
    /// The first copy is exact, the rest are lightly mutated.
    pub fn seed_with_fractal(&self, genome: &Genome, copies: usize) {
        let mut population = self.working_population();
        let copies = copies.min(population.len());
        let mut rng = lock(&self.seeding_rng);

        let tail = population.len() - copies;
        for (k, slot) in population[tail..].iter_mut().enumerate() {
            let mut copy = sanitize(genome.clone());
            if k > 0 {
                rng.mutate(&mut copy, SEED_MUTATION_RATE);
            }
            *slot = copy;
        }
        drop(rng);

        log::info!("Seeded population with {copies} copies of a genome");
        self.replace_population(population);
    }

    /// Place each of `genomes` once at the tail of the population.
    pub fn seed_with_fractals(&self, genomes: &[Genome]) {
        let mut population = self.working_population();
        let count = genomes.len().min(population.len());
        let tail = population.len() - count;

        for (slot, genome) in population[tail..].iter_mut().zip(genomes) {
            *slot = sanitize(genome.clone());
        }

        log::info!("Seeded population with {count} genomes");
        self.replace_population(population);
    }

    /// Population a seeding call should start from, sized to the parameters.
    fn working_population(&self) -> Vec<Genome> {
        let population = {
            let snapshot = lock(&self.shared.snapshot);
            snapshot
                .pending
                .clone()
                .unwrap_or_else(|| snapshot.population.clone())
        };
        self.fit_to_size(population)
    }

    /// Truncate or pad with random genomes to `population_size`.
    fn fit_to_size(&self, mut population: Vec<Genome>) -> Vec<Genome> {
        let size = self.shared.parameters().population_size;
        population.truncate(size);
        if population.len() < size {
            let mut rng = lock(&self.seeding_rng);
            population.extend((population.len()..size).map(|_| rng.random_genome()));
        }
        population
    }

    fn replace_population(&self, population: Vec<Genome>) {
        let mut snapshot = lock(&self.shared.snapshot);
        if self.is_running() {
            snapshot.pending = Some(population);
        } else {
            snapshot.population = population;
            snapshot.evaluated = false;
            snapshot.pending = None;
        }
    }

    /// Join a finished worker and take back its search state.
    fn reclaim_worker(&self, worker: &mut Option<JoinHandle<Breeder>>) {
        let Some(handle) = worker.take() else {
            return;
        };
        match handle.join() {
            Ok(breeder) => *lock(&self.breeder) = Some(breeder),
            Err(_) => log::error!("Evolution worker panicked; search state was reset"),
        }
    }
}

impl Drop for EvolutionEngine {
    fn drop(&mut self) {
        self.stop_evolution();
    }
}

/// Fresh genome state: clamped genes and no fitness.
fn sanitize(mut genome: Genome) -> Genome {
    genome.clamp_to_bounds();
    genome.fitness = 0.0;
    genome
}

fn build_pool(thread_count: usize) -> Option<ThreadPool> {
    match ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .thread_name(|i| format!("fitness-{i}"))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(err) => {
            log::warn!("Falling back to sequential evaluation: {err}");
            None
        }
    }
}

/// Fitness of one genome; failures and panics score zero.
fn evaluate_genome(evaluator: &FitnessEvaluator, genome: &Genome) -> f32 {
    match catch_unwind(AssertUnwindSafe(|| evaluator.evaluate_detailed(genome))) {
        Ok(Ok(breakdown)) => breakdown.fitness,
        Ok(Err(err)) => {
            log::warn!("Fitness evaluation failed, scoring zero: {err}");
            0.0
        }
        Err(_) => {
            log::warn!("Fitness evaluation panicked, scoring zero");
            0.0
        }
    }
}

/// Evaluate every genome in place. Returns `false` if cancelled part way.
fn evaluate_population(
    shared: &Shared,
    pool: Option<&ThreadPool>,
    evaluator: &FitnessEvaluator,
    population: &mut [Genome],
) -> bool {
    let threads = pool.map_or(1, ThreadPool::current_num_threads);
    let batch = (threads * BATCH_PER_THREAD).max(1);

    for chunk in population.chunks_mut(batch) {
        if !shared.wait_while_paused() {
            return false;
        }
        match pool {
            Some(pool) => pool.install(|| {
                chunk
                    .par_iter_mut()
                    .for_each(|genome| genome.fitness = evaluate_genome(evaluator, genome));
            }),
            None => {
                for genome in chunk.iter_mut() {
                    genome.fitness = evaluate_genome(evaluator, genome);
                }
            }
        }
    }
    true
}

/// Publish an evaluated generation, waiting out a pause.
///
/// Returns `false` if cancelled before publishing.
fn publish(shared: &Shared, population: &[Genome], stats: &EvolutionStats) -> bool {
    loop {
        {
            let mut snapshot = lock(&shared.snapshot);
            if shared.is_cancelled() {
                return false;
            }
            if !shared.paused.load(Ordering::Acquire) {
                snapshot.population = population.to_vec();
                snapshot.stats = stats.clone();
                snapshot.evaluated = true;
                return true;
            }
        }
        thread::sleep(PAUSE_POLL);
    }
}

fn notify(shared: &Shared, breeder: &mut Breeder, population: &[Genome], stats: &EvolutionStats) {
    let generation_callback = shared
        .generation_callback
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(callback) = generation_callback
        && catch_unwind(AssertUnwindSafe(|| callback(stats.current_generation, stats))).is_err()
    {
        log::warn!("Generation callback panicked");
    }

    if !breeder.crossed_best_found(stats.best_fitness) {
        return;
    }
    let best_found_callback = shared
        .best_found_callback
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let best = population
        .iter()
        .max_by(|a, b| a.fitness.total_cmp(&b.fitness));
    if let (Some(callback), Some(best)) = (best_found_callback, best)
        && catch_unwind(AssertUnwindSafe(|| callback(best, best.fitness))).is_err()
    {
        log::warn!("Best-found callback panicked");
    }
}

/// Worker liveness, cleared however the worker exits.
struct WorkerGuard<'a> {
    shared: &'a Shared,
}

impl<'a> WorkerGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        *lock(&shared.worker_id) = Some(thread::current().id());
        Self { shared }
    }
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            log::error!("Evolution worker panicked");
            lock(&self.shared.snapshot).stats.stop_reason = Some(StopReason::Cancelled);
        }
        *lock(&self.shared.worker_id) = None;
        self.shared.running.store(false, Ordering::Release);
    }
}

/// Worker thread entry. Returns the search state matching the published snapshot.
fn run_worker(shared: Arc<Shared>, mut breeder: Breeder) -> Breeder {
    let _guard = WorkerGuard::enter(&shared);

    // Search state as of the last published generation.
    let mut committed = breeder.clone();
    let reason = evolve(&shared, &mut breeder, &mut committed);

    let generation = {
        let mut snapshot = lock(&shared.snapshot);
        snapshot.stats.stop_reason = Some(reason);
        snapshot.stats.current_generation
    };
    log::info!("Evolution finished after generation {generation}: {reason:?}");

    if reason == StopReason::Cancelled {
        committed
    } else {
        breeder
    }
}

/// Generational loop. Returns why it ended.
fn evolve(shared: &Shared, breeder: &mut Breeder, committed: &mut Breeder) -> StopReason {
    let initial = shared.parameters();
    let pool = build_pool(initial.thread_count);

    let (mut population, previous, resume) = {
        let mut snapshot = lock(&shared.snapshot);
        let resume = snapshot.evaluated && snapshot.pending.is_none();
        let population = snapshot
            .pending
            .take()
            .unwrap_or_else(|| snapshot.population.clone());
        (population, snapshot.stats.clone(), resume)
    };
    let mut generation = previous.current_generation;

    // Resume from an already evaluated generation by breeding first, unless
    // that generation already ended the run.
    if resume {
        if let Some(reason) = breeder.should_stop(&previous, &initial) {
            log::info!("Evolution already finished at generation {generation}");
            return reason;
        }
        population = breeder.breed(&population, &initial, generation);
    }

    let started = Instant::now();
    let mut generations_run = 0u32;
    let mut evaluations = 0u64;

    loop {
        if !shared.wait_while_paused() {
            return StopReason::Cancelled;
        }

        let params = shared.parameters();
        if let Some(pending) = lock(&shared.snapshot).pending.take() {
            population = pending;
        }
        if population.len() != params.population_size {
            population.truncate(params.population_size);
            let missing = params.population_size - population.len();
            population.extend(breeder.initial_population(missing));
        }

        let evaluator = FitnessEvaluator::new(params.fitness_weights, params.render);
        if !evaluate_population(shared, pool.as_ref(), &evaluator, &mut population) {
            return StopReason::Cancelled;
        }

        generations_run += 1;
        evaluations += population.len() as u64;

        let mut stats = breeder.observe(&population, &params, generation + 1);
        let elapsed = started.elapsed().as_secs_f32().max(f32::EPSILON);
        stats.generations_per_second = generations_run as f32 / elapsed;
        stats.evaluations_per_second = evaluations as f32 / elapsed;
        stats.stop_reason = breeder.should_stop(&stats, &params);

        if !publish(shared, &population, &stats) {
            return StopReason::Cancelled;
        }
        generation += 1;

        log::debug!(
            "Generation {}: best {:.4}, avg {:.4}, diversity {:.3}, species {}",
            generation,
            stats.best_fitness,
            stats.average_fitness,
            stats.diversity_index,
            stats.species_count
        );

        notify(shared, breeder, &population, &stats);
        *committed = breeder.clone();

        if let Some(reason) = stats.stop_reason {
            return reason;
        }
        if shared.is_cancelled() {
            return StopReason::Cancelled;
        }

        population = breeder.breed(&population, &params, generation);
    }
}
