pub mod batch;
pub mod capture_config;
pub mod config;
pub mod jobs;
pub mod logs;
pub mod params;
pub mod postproc;
pub mod receiver;
pub mod spectrogram;
pub mod stfft;
