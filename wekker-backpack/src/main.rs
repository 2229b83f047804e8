use std::time::Duration;

use chrono::Local;
use embassy_futures::block_on;
use log::{debug, info, warn};
use wekker_backpack::{Blocking, Config, SevenSegment};

const CONFIG_PATH: &str = "./wekker.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::fs::read_to_string(CONFIG_PATH) {
        Ok(json) => Config::from_json(&json)?,
        Err(_) => Config::default(),
    };

    let opener = |bus: u8| {
        debug!("opening first MCP2221 bridge as bus {}", bus);
        mcp2221::Handle::open_first(&mcp2221::Config::default()).map(Blocking::new)
    };
    let mut display = block_on(SevenSegment::open_with(opener, &config))?;
    info!("display ready at {:#04x}", display.display().address());

    loop {
        display.write_time(&Local::now());
        if let Err(err) = block_on(display.flush()) {
            warn!("{}", err);
        }

        std::thread::sleep(Duration::from_secs(1));
    }
}
