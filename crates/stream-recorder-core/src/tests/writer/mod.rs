mod ffmpeg;
mod segment;
