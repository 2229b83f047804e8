use std::time::Duration;

use embassy_futures::block_on;
use wekker_backpack::{Blocking, SevenSegment, I2C_ADDR};

fn main() {
    env_logger::init();

    let opener = |_bus: u8| mcp2221::Handle::open_first(&mcp2221::Config::default()).map(Blocking::new);
    let mut display = block_on(SevenSegment::open(opener, 0, I2C_ADDR)).unwrap();

    println!("Counting brightness up.");
    display.write_number(8888);
    block_on(display.flush()).unwrap();
    for level in 0..=15 {
        block_on(display.display_mut().set_brightness(level)).unwrap();
        std::thread::sleep(Duration::from_millis(250));
    }

    println!("Sleeping for 10 seconds...");
    std::thread::sleep(Duration::from_secs(10));

    println!("Turning off display.");
    block_on(display.display_mut().shutdown()).unwrap();
}
