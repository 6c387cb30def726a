//! Check the encoder and configuration.

use heliomovie_common::config::AppConfig;
use heliomovie_render_engine::{EncoderInvoker, Watermark};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Heliomovie System Check");
    println!("{}", "=".repeat(50));

    let mut ok = true;

    let invoker = EncoderInvoker::from_config(&config.encoder);
    if invoker.is_available() {
        println!("[OK] Encoder: {}", invoker.program().display());
    } else {
        println!(
            "[FAIL] Encoder: {} not found or not runnable",
            invoker.program().display()
        );
        ok = false;
    }

    match config.validate() {
        Ok(()) => println!("[OK] Configuration"),
        Err(e) => {
            println!("[FAIL] Configuration: {e}");
            ok = false;
        }
    }

    match std::fs::create_dir_all(&config.work_dir) {
        Ok(()) => println!("[OK] Work dir: {}", config.work_dir.display()),
        Err(e) => {
            println!("[FAIL] Work dir {}: {e}", config.work_dir.display());
            ok = false;
        }
    }
    println!("     Movies dir: {}", config.movies_dir.display());

    match Watermark::load(&config.watermark) {
        Ok(Some(_)) => println!("[OK] Watermark resources loaded"),
        Ok(None) => println!("[WARN] Watermark: nothing to draw"),
        Err(e) => {
            println!("[FAIL] Watermark: {e}");
            ok = false;
        }
    }

    println!();
    if ok {
        println!("Heliomovie is ready.");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Some checks failed. See above."))
    }
}
