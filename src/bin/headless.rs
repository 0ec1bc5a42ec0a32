use tioga::core::backend::HeadlessBackend;
use tioga::core::render::headless::{HeadlessGpu, HeadlessSwapchain};
use tioga::core::render::{GpuContext, Swapchain};
use tioga::core::types::Extent;
use tioga::{run, Server, ServerConfig};

fn main() -> anyhow::Result<()> {
    tioga::util::logging::init(tracing::Level::DEBUG, None)?;

    let server = Server::new(
        ServerConfig::default(),
        Box::new(HeadlessBackend::new()),
        Box::new(HeadlessGpu::new()),
        Box::new(|gpu: &mut dyn GpuContext, extent: Extent| {
            HeadlessSwapchain::new(gpu, extent).map(|chain| Box::new(chain) as Box<dyn Swapchain>)
        }),
    )?;

    println!("Headless tioga compositor listening...");
    run(server)?;
    Ok(())
}
