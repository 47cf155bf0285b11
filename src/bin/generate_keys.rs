use anyhow::Result;

fn main() -> Result<()> {
    web_push_enable::logging::init_logger();

    let keys = web_push_enable::vapid::generate()?;

    println!("VAPID_PUBLIC_KEY={}", keys.public_key);
    println!("VAPID_PRIVATE_KEY={}", keys.private_key);
    Ok(())
}
