use anyhow::Result;
use sdr_core::client::Session;
use sdr_core::config::SessionConfig;

pub fn run(config: SessionConfig) -> Result<()> {
	let session = Session::connect(config)?;
	let words = session.hello()?;
	println!("hello: {words:?}");
	Ok(())
}
