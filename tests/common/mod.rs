pub mod ffmpeg_runner;
