// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Command-line bootstrap: loads a JSON pipeline configuration, spawns the acquisition thread
//! and one worker thread per configured channel, and runs until interrupted.

use std::fs;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::{App, Arg};
use log::{error, info, warn};

use sdr_core::alloc::FrameAllocator;
use sdr_core::buffer::SampleKind;
use sdr_core::dsp::dc_blocker::DcBlocker;
use sdr_core::dsp::direct_fir::{DirectFir, Derotator};
use sdr_core::dsp::polyphase_fir::PolyphaseFirReal;
use sdr_core::queue::SpscQueue;
use sdr_pipeline::config::{PipelineConfig, Protocol};
use sdr_pipeline::decoder::ChannelDecoder;
use sdr_pipeline::sink::PcmSink;
use sdr_pipeline::source::FileReplaySource;
use sdr_pipeline::worker::{Acquisition, ChannelWorker, WorkerStateCell};

/// Samples pulled from the source per acquisition read. Matches the original's default
/// `samples_per_buf` used when sizing the sample-buffer pool.
const SAMPLES_PER_BUF: usize = 16384;
const CHANNEL_QUEUE_CAPACITY: usize = 64;

fn main() {
    pretty_env_logger::init();

    let matches = App::new("sdr-play")
        .version("0.1.0")
        .about("Channelized FM demodulation and pager/AIS decoding pipeline")
        .arg(
            Arg::with_name("CONFIG")
                .help("Path to the pipeline's JSON configuration file")
                .required(true)
                .index(1),
        )
        .get_matches();

    let config_path = matches.value_of("CONFIG").unwrap();

    let text = match fs::read_to_string(config_path) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to read configuration file {config_path}: {e}");
            std::process::exit(1);
        }
    };

    let config = match PipelineConfig::from_json(&text) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to parse configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config) {
        error!("pipeline exited with an error: {e}");
        std::process::exit(1);
    }
}

fn run(config: PipelineConfig) -> sdr_core::error::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested");
            running.store(false, Ordering::Relaxed);
        })
        .expect("failed to install Ctrl-C handler");
    }

    let frame_size = SAMPLES_PER_BUF * SampleKind::Cs16.sample_bytes();
    let allocator = Arc::new(FrameAllocator::new(config.nr_samp_bufs, frame_size));

    let iq_dump_file = config.iq_dump_file.clone().ok_or(sdr_core::error::Error::BadArgs("iqDumpFile"))?;
    let source = Box::new(FileReplaySource::open(&iq_dump_file, SampleKind::Cs16, config.sdr_test_mode)?);

    let mut queues = Vec::with_capacity(config.channels.len());
    let mut handles = Vec::with_capacity(config.channels.len());

    for chan in &config.channels {
        let queue = Arc::new(SpscQueue::new(CHANNEL_QUEUE_CAPACITY));
        queues.push(queue.clone());

        let derotator = Derotator::new(
            (chan.chan_center_freq as f64) - (config.center_freq_hz as f64),
            config.sample_rate_hz as f64,
            config.decimation_factor,
        );
        let direct_fir = DirectFir::new(config.lpf_taps_q15(), config.lpf_taps_q15(), config.decimation_factor, Some(derotator));

        let dc_blocker = config.enable_dc_blocker.then(|| DcBlocker::new(config.dc_blocker_pole));
        let resampler = config
            .rational_resampler
            .as_ref()
            .map(|r| PolyphaseFirReal::new(&r.lpf_coeffs_q15(), r.interpolate, r.decimate));
        let squelch_dbfs = chan.d_b_gain as i32;

        let out_file = File::create(&chan.out_fifo)?;
        let freq_hz = chan.chan_center_freq;

        let mut worker = match chan.protocol {
            Protocol::None => ChannelWorker::new_pcm(freq_hz, direct_fir, dc_blocker, resampler, squelch_dbfs, PcmSink::new(out_file)),
            Protocol::Flex => {
                ChannelWorker::new(freq_hz, direct_fir, dc_blocker, resampler, squelch_dbfs, ChannelDecoder::flex(freq_hz, out_file))
            }
            Protocol::Pocsag => {
                ChannelWorker::new(freq_hz, direct_fir, dc_blocker, resampler, squelch_dbfs, ChannelDecoder::pocsag(freq_hz, out_file))
            }
            Protocol::Ais => {
                ChannelWorker::new(freq_hz, direct_fir, dc_blocker, resampler, squelch_dbfs, ChannelDecoder::ais(freq_hz, out_file))
            }
        };

        let running = running.clone();
        let state = Arc::new(WorkerStateCell::new());
        let worker_queue = queue.clone();
        handles.push(thread::spawn(move || {
            worker.run(&worker_queue, &running, &state);
        }));
    }

    let samples_per_buf = SAMPLES_PER_BUF;
    let mut acquisition = Acquisition::new(source, allocator, queues.iter().cloned().collect(), samples_per_buf);
    acquisition.run(&running);

    running.store(false, Ordering::Relaxed);
    for queue in &queues {
        queue.close();
    }

    for handle in handles {
        if handle.join().is_err() {
            warn!("a channel worker thread panicked");
        }
    }

    let pool_exhausted = acquisition.nr_samp_buf_alloc_fails();
    if pool_exhausted > 0 {
        warn!("acquisition dropped {pool_exhausted} sample buffers because the frame pool was exhausted");
    }
    let queue_full = acquisition.nr_queue_drops();
    if queue_full > 0 {
        warn!("acquisition dropped {queue_full} sample buffers because a channel queue was full");
    }

    Ok(())
}
