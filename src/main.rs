//! LS-8 Emulator - CLI Entry Point
//!
//! Usage:
//! - `ls8 <program>` - Run a `.ls8` image (or `.asm` source) until it halts
//! - `ls8 debug <program>` - Interactive debugger
//! - `ls8 asm <source>` - Assemble to a `.ls8` image
//! - `ls8 disasm <image>` - Disassemble an image
//! - `ls8 test` - Built-in self-test
//!
//! While a program runs, stdout carries only the values it prints.
//! Diagnostics go to stderr.

use clap::{Args, Parser, Subcommand};
use ls8::cpu::memory::DEFAULT_MEMORY_SIZE;
use ls8::Cpu;
use simple_logger::SimpleLogger;
use std::path::Path;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ls8")]
#[command(version)]
#[command(about = "An emulator for the LS-8 8-bit teaching computer")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the .ls8 image (or .asm source) to run
    program: Option<String>,

    #[command(flatten)]
    run: RunOptions,
}

#[derive(Args)]
struct RunOptions {
    /// Stop after this many cycles if the program has not halted
    #[arg(short, long)]
    max_cycles: Option<u64>,

    /// Log every executed instruction to stderr
    #[arg(short, long)]
    trace: bool,

    /// Print the final CPU state as JSON to stderr
    #[arg(long)]
    dump_state: bool,

    /// Delay between cycles in milliseconds
    #[arg(long, default_value = "0")]
    clock_ms: u64,

    /// Memory size in bytes (1-256)
    #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE)]
    memory_size: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive debugger
    Debug {
        /// Path to the .ls8 image or .asm source to debug
        program: String,
    },
    /// Assemble source to a .ls8 image
    Asm {
        /// Path to the source file
        source: String,
        /// Output image file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Disassemble a .ls8 image to readable text
    Disasm {
        /// Path to the image file
        image: String,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.run.trace);

    match (cli.command, cli.program) {
        (Some(Commands::Debug { program }), _) => {
            debug_program(&program);
        }
        (Some(Commands::Asm { source, output }), _) => {
            assemble_file(&source, output);
        }
        (Some(Commands::Disasm { image }), _) => {
            disassemble_file(&image);
        }
        (Some(Commands::Test), _) => {
            run_self_test();
        }
        (None, Some(program)) => {
            run_program(&program, &cli.run);
        }
        (None, None) => {
            std::process::exit(usage_error());
        }
    }
}

const USAGE: &str = "usage: ls8 <program.ls8>";

/// Report a missing program argument. Returns the exit status.
fn usage_error() -> i32 {
    eprintln!("{}", USAGE);
    1
}

fn init_logging(trace: bool) {
    let level = if trace { log::LevelFilter::Trace } else { log::LevelFilter::Warn };
    if let Err(e) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("failed to initialise logging: {}", e);
    }
}

/// Read a program: `.asm` files are assembled, anything else is parsed as
/// an image. Exits on failure.
fn read_program(path: &str) -> Vec<u8> {
    use ls8::{assemble, load_image};

    if path.ends_with(".asm") {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Failed to read file: {}", e);
                std::process::exit(1);
            }
        };

        match assemble(&source) {
            Ok(bytes) => {
                log::info!("assembled {} bytes from {}", bytes.len(), path);
                bytes
            }
            Err(e) => {
                eprintln!("❌ Assembly error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match load_image(path) {
            Ok(image) => {
                log::info!("loaded {} bytes from {}", image.len(), path);
                image.bytes
            }
            Err(e) => {
                eprintln!("❌ Failed to load image: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run_program(path: &str, opts: &RunOptions) {
    let program = read_program(path);

    let mut cpu = match prepare(&program, opts.memory_size) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let status = execute(&mut cpu, opts);

    if opts.dump_state {
        match serde_json::to_string_pretty(&cpu) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("❌ Failed to serialize state: {}", e),
        }
    }

    std::process::exit(status);
}

/// Build a CPU with `program` loaded at address 0.
fn prepare(program: &[u8], memory_size: usize) -> Result<Cpu, String> {
    if program.is_empty() {
        return Err("No instructions to execute".into());
    }

    let mut cpu = Cpu::with_memory_size(memory_size).map_err(|e| e.to_string())?;
    cpu.load_program(program)
        .map_err(|e| format!("Failed to load program: {}", e))?;
    Ok(cpu)
}

/// Run until the CPU stops. Returns the process exit status: 0 on HLT,
/// 1 on a fault or when the cycle limit is reached first.
fn execute(cpu: &mut Cpu, opts: &RunOptions) -> i32 {
    let delay = Duration::from_millis(opts.clock_ms);
    let mut status = 0;

    while cpu.is_running() {
        if opts.max_cycles.is_some_and(|max| cpu.cycles >= max) {
            eprintln!("⚠️  Reached max cycles limit ({}) without halting", cpu.cycles);
            status = 1;
            break;
        }

        let pc = cpu.regs.pc;
        if let Err(e) = cpu.step() {
            eprintln!("❌ CPU error at PC={:02x}: {}", pc, e);
            status = 1;
            break;
        }

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    log::info!("{} cycles, state {:?}", cpu.cycles, cpu.state);
    status
}

#[cfg(feature = "tui")]
fn debug_program(path: &str) {
    use ls8::tui::run_debugger;

    let program = read_program(path);
    if program.is_empty() {
        eprintln!("❌ No instructions to execute");
        std::process::exit(1);
    }

    if let Err(e) = run_debugger(program) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_path: &str) {
    eprintln!("❌ This build has no debugger (enable the `tui` feature)");
    std::process::exit(1);
}

fn assemble_file(source_path: &str, output: Option<String>) {
    use ls8::{assemble, save_image};

    let out_path = output.unwrap_or_else(|| {
        Path::new(source_path).with_extension("ls8").to_string_lossy().into_owned()
    });

    println!("📝 Assembling: {} → {}", source_path, out_path);

    // Read source
    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    };

    // Assemble
    let bytes = match assemble(&source) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("❌ Assembly error: {}", e);
            std::process::exit(1);
        }
    };

    println!("✓ Assembled {} bytes", bytes.len());

    if let Err(e) = save_image(&out_path, &bytes) {
        eprintln!("❌ Failed to save image: {}", e);
        std::process::exit(1);
    }

    println!("✓ Saved to {}", out_path);
}

fn disassemble_file(image_path: &str) {
    use ls8::{disassemble, load_image};

    let image = match load_image(image_path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", disassemble(&image.bytes));
}

fn run_self_test() {
    use ls8::{assemble, parse_image, CaptureConsole, CpuError};
    use ls8::cpu::DecodeError;

    /// Run a program to completion, returning what it printed.
    fn run(program: &[u8]) -> Result<Vec<u8>, CpuError> {
        let console = CaptureConsole::new();
        let mut cpu = Cpu::with_console(console.clone());
        cpu.load_program(program)?;
        cpu.run_limited(10_000)?;
        Ok(console.values())
    }

    fn check(name: &str, ok: bool, passed: &mut u32, failed: &mut u32) {
        if ok {
            println!("{}... ✓", name);
            *passed += 1;
        } else {
            println!("{}... ✗", name);
            *failed += 1;
        }
    }

    println!("━━━ LS-8 Emulator Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    // Test 1: print8 image
    let print8 = parse_image("10011001\n00000000\n00001000\n01000011\n00000000\n00000001\n");
    check("print8 image", run(&print8.bytes) == Ok(vec![8]), &mut passed, &mut failed);

    // Test 2: ALU wraps
    let program = assemble("LDI R0, 200\nLDI R1, 100\nADD R0, R1\nPRN R0\nMUL R0, R1\nPRN R0\nHLT");
    check(
        "ALU wraps modulo 256",
        program.map(|p| run(&p)) == Ok(Ok(vec![44, 48])),
        &mut passed,
        &mut failed,
    );

    // Test 3: stack
    let program = assemble("LDI R0, 7\nPUSH R0\nLDI R0, 1\nPOP R1\nPRN R1\nHLT");
    check("PUSH/POP", program.map(|p| run(&p)) == Ok(Ok(vec![7])), &mut passed, &mut failed);

    // Test 4: call/return
    let program = assemble("LDI R1, SUB\nCALL R1\nPRN R0\nHLT\nSUB: LDI R0, 99\nRET");
    check("CALL/RET", program.map(|p| run(&p)) == Ok(Ok(vec![99])), &mut passed, &mut failed);

    // Test 5: compare and branch
    let program = assemble(
        "LDI R0, 5\nLDI R1, 5\nLDI R2, EQ\nCMP R0, R1\nJEQ R2\nPRN R2\nHLT\nEQ: PRN R1\nHLT",
    );
    check("CMP/JEQ", program.map(|p| run(&p)) == Ok(Ok(vec![5])), &mut passed, &mut failed);

    // Test 6: illegal instruction
    check(
        "Illegal instruction halts",
        run(&[0xFF]) == Err(CpuError::Decode(DecodeError::IllegalInstruction(0xFF))),
        &mut passed,
        &mut failed,
    );

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
