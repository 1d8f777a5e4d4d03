use agbemu_utils::audio::AudioRingBuffer;

/// System clock, 2^24 Hz.
pub const GBA_CLOCK_FREQ: usize = 16_777_216;

pub const DEFAULT_SAMPLE_RATE: usize = 44_100;

/// Sample pacing for the APU. Mixing of the PSG/FIFO channels is not
/// modeled; the unit produces correctly-paced silence at the host sample
/// rate and tracks the few registers the scheduler and games poke.
#[derive(Serialize, Deserialize)]
pub struct SoundController {
    /// SOUNDCNT_X bit 7, master enable
    pub mse: bool,
    pub soundbias: u16,

    sample_rate: usize,
    cycles_per_sample: usize,
    cycles: usize,

    #[serde(skip)]
    buffer: AudioRingBuffer,
}

impl Clone for SoundController {
    fn clone(&self) -> SoundController {
        // the sample backlog is transient and not carried over
        SoundController {
            mse: self.mse,
            soundbias: self.soundbias,
            sample_rate: self.sample_rate,
            cycles_per_sample: self.cycles_per_sample,
            cycles: self.cycles,
            buffer: AudioRingBuffer::default(),
        }
    }
}

impl SoundController {
    pub fn new(sample_rate: usize) -> SoundController {
        SoundController {
            mse: false,
            soundbias: 0x200,
            sample_rate,
            cycles_per_sample: GBA_CLOCK_FREQ / sample_rate,
            cycles: 0,
            buffer: AudioRingBuffer::default(),
        }
    }

    pub fn reset(&mut self) {
        self.mse = false;
        self.soundbias = 0x200;
        self.cycles = 0;
    }

    pub fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    pub fn read_soundcnt_x(&self) -> u16 {
        (self.mse as u16) << 7
    }

    pub fn write_soundcnt_x(&mut self, value: u16) {
        let new_mse = value & (1 << 7) != 0;
        if self.mse != new_mse {
            debug!("sound master enable: {}", new_mse);
        }
        self.mse = new_mse;
    }

    /// Advance by bus cycles, emitting one stereo sample pair per host
    /// sample period.
    pub fn step(&mut self, cycles: usize) {
        self.cycles += cycles;
        while self.cycles >= self.cycles_per_sample {
            self.cycles -= self.cycles_per_sample;
            let sample = 0i16;
            let prod = self.buffer.producer();
            let _ = prod.push(sample);
            let _ = prod.push(sample);
        }
    }

    /// Drain up to `count` produced samples; missing samples are padded
    /// with silence so the caller always gets `count` back.
    pub fn get_samples(&mut self, count: usize) -> Vec<i16> {
        let mut out = Vec::with_capacity(count);
        let cons = self.buffer.consumer();
        while out.len() < count {
            match cons.pop() {
                Some(sample) => out.push(sample),
                None => break,
            }
        }
        out.resize(count, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_samples_at_host_rate() {
        let mut apu = SoundController::new(DEFAULT_SAMPLE_RATE);
        let period = GBA_CLOCK_FREQ / DEFAULT_SAMPLE_RATE;
        apu.step(period * 10);
        let samples = apu.get_samples(20);
        assert_eq!(samples.len(), 20);
    }

    #[test]
    fn get_samples_pads_with_silence() {
        let mut apu = SoundController::new(DEFAULT_SAMPLE_RATE);
        let samples = apu.get_samples(8);
        assert_eq!(samples, vec![0i16; 8]);
    }

    #[test]
    fn master_enable_bit() {
        let mut apu = SoundController::new(DEFAULT_SAMPLE_RATE);
        apu.write_soundcnt_x(1 << 7);
        assert!(apu.mse);
        assert_eq!(apu.read_soundcnt_x(), 1 << 7);
    }
}
