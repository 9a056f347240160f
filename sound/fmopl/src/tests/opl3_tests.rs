#[cfg(test)]
mod opl3_tests {
    use crate::channel::Route;
    use crate::tests::*;
    use crate::{Chip, ChipType, EnvelopeState, SIN_LEN};

    fn four_op_chip(first_con: bool, second_con: bool) -> Chip {
        let mut chip = native_chip(ChipType::Opl3);
        chip.write_register(0x105, 1);
        chip.write_register(0x104, 0x01);
        write_tone(&mut chip, 0, first_con);
        write_tone(&mut chip, 3, second_con);
        chip
    }

    fn state(chip: &Chip, ch: usize, op: usize) -> EnvelopeState {
        chip.channel(ch).unwrap().slot(op).unwrap().envelope_state()
    }

    #[test]
    fn test_bank_one_needs_opl3_mode() {
        let mut chip = native_chip(ChipType::Opl3);
        chip.write(2, 0xa0);
        chip.write(3, 0x55);
        assert_eq!(chip.channel(0).unwrap().block_fnum().fnum(), 0x55);
        assert_eq!(chip.channel(9).unwrap().block_fnum().fnum(), 0);

        // 0x105 is always reachable
        chip.write(2, 0x05);
        chip.write(3, 0x01);
        assert!(chip.opl3_mode());

        chip.write(2, 0xa0);
        chip.write(3, 0x66);
        assert_eq!(chip.channel(9).unwrap().block_fnum().fnum(), 0x66);
        chip.write(0, 0xa0);
        chip.write(1, 0x77);
        assert_eq!(chip.channel(0).unwrap().block_fnum().fnum(), 0x77);
    }

    #[test]
    fn test_unused_channel_registers_ignored() {
        let mut chip = native_chip(ChipType::Opl3);
        chip.write_register(0x105, 1);
        for ch in 0..18 {
            write_tone(&mut chip, ch, false);
        }
        let before: Vec<_> = chip.channels().iter().map(|ch| ch.block_fnum()).collect();
        // channel nibble 9 and above decode to nothing
        chip.write_register(0xa9, 0x12);
        chip.write_register(0x1af, 0x34);
        let after: Vec<_> = chip.channels().iter().map(|ch| ch.block_fnum()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_pair_keys_all_four_slots() {
        let mut chip = four_op_chip(false, false);
        key_on(&mut chip, 3);
        for op in 0..2 {
            assert_eq!(state(&chip, 3, op), EnvelopeState::Off);
        }

        key_on(&mut chip, 0);
        for ch in [0, 3] {
            for op in 0..2 {
                assert_eq!(state(&chip, ch, op), EnvelopeState::Attack);
            }
        }
        key_off(&mut chip, 0);
        for ch in [0, 3] {
            for op in 0..2 {
                assert_eq!(state(&chip, ch, op), EnvelopeState::Release);
            }
        }
    }

    #[test]
    fn test_pair_follows_first_frequency() {
        let mut chip = four_op_chip(true, true);
        key_on(&mut chip, 0);
        chip.write_register(0xa0, 0x40);
        render_mixed(&mut chip, 10);

        let low = chip.channel(0).unwrap().slot(0).unwrap().phase();
        let high = chip.channel(3).unwrap().slot(0).unwrap().phase();
        assert_ne!(low.raw(), 0);
        assert_eq!(low, high);
    }

    #[test]
    fn test_four_op_routing() {
        let chip = four_op_chip(false, false);
        let routes: Vec<Route> = [(0, 0), (0, 1), (3, 0), (3, 1)]
            .iter()
            .map(|&(ch, op)| chip.channel(ch).unwrap().slot(op).unwrap().route())
            .collect();
        assert_eq!(
            routes,
            [Route::PhaseMod, Route::PhaseMod2, Route::PhaseMod, Route::Output(3)]
        );
    }

    #[test]
    fn test_serial_pair_outputs_on_second_channel() {
        let mut chip = four_op_chip(false, false);
        key_on(&mut chip, 0);
        let (voices, _) = render_voices(&mut chip, 500);
        assert!(is_silent(&voices[0]));
        assert!(!is_silent(&voices[3]));
    }

    #[test]
    fn test_parallel_pair_outputs_on_both_channels() {
        let mut chip = four_op_chip(true, true);
        key_on(&mut chip, 0);
        let (voices, _) = render_voices(&mut chip, 500);
        assert!(!is_silent(&voices[0]));
        assert!(!is_silent(&voices[3]));
    }

    #[test]
    fn test_splitting_pair_restores_two_op() {
        let mut chip = four_op_chip(false, true);
        chip.write_register(0x104, 0x00);
        assert!(!chip.channel(0).unwrap().extended());
        for ch in [0, 3] {
            let channel = chip.channel(ch).unwrap();
            assert_eq!(channel.slot(1).unwrap().route(), Route::Output(ch));
        }
        assert_eq!(chip.channel(0).unwrap().slot(0).unwrap().route(), Route::PhaseMod);
        assert_eq!(chip.channel(3).unwrap().slot(0).unwrap().route(), Route::Output(3));

        // the second channel plays on its own again
        key_on(&mut chip, 3);
        assert_eq!(state(&chip, 3, 0), EnvelopeState::Attack);
        assert_eq!(state(&chip, 0, 0), EnvelopeState::Off);
    }

    #[test]
    fn test_pairs_ignored_outside_opl3_mode() {
        let mut chip = native_chip(ChipType::Opl3);
        chip.write_register(0x104, 0x01);
        write_tone(&mut chip, 0, false);
        write_tone(&mut chip, 3, false);
        key_on(&mut chip, 3);
        assert_eq!(state(&chip, 3, 0), EnvelopeState::Attack);
        assert_eq!(chip.channel(3).unwrap().slot(1).unwrap().route(), Route::Output(3));
    }

    #[test]
    fn test_mode_switch_reroutes_pairs() {
        let mut chip = native_chip(ChipType::Opl3);
        chip.write_register(0x104, 0x01);
        write_tone(&mut chip, 0, false);
        write_tone(&mut chip, 3, false);
        let route = |chip: &Chip| chip.channel(0).unwrap().slot(1).unwrap().route();
        assert_eq!(route(&chip), Route::Output(0));

        chip.write_register(0x105, 1);
        assert_eq!(route(&chip), Route::PhaseMod2);
        chip.write_register(0x105, 0);
        assert_eq!(route(&chip), Route::Output(0));
    }

    #[test]
    fn test_output_masks() {
        let mut chip = native_chip(ChipType::Opl3);
        chip.write_register(0x105, 1);
        write_tone(&mut chip, 0, false);
        write_tone(&mut chip, 1, false);
        // channel 0 left only, channel 1 right only
        chip.write_register(0xc0, 0x10);
        chip.write_register(0xc1, 0x20);
        key_on(&mut chip, 0);
        key_on(&mut chip, 1);

        let (voices, _) = render_voices(&mut chip, 500);
        let left = |v: &[i32]| v.iter().step_by(2).copied().collect::<Vec<_>>();
        let right = |v: &[i32]| v.iter().skip(1).step_by(2).copied().collect::<Vec<_>>();
        assert!(!is_silent(&left(&voices[0])));
        assert!(is_silent(&right(&voices[0])));
        assert!(is_silent(&left(&voices[1])));
        assert!(!is_silent(&right(&voices[1])));
    }

    #[test]
    fn test_mono_outside_opl3_mode() {
        let mut chip = native_chip(ChipType::Opl3);
        write_tone(&mut chip, 0, false);
        chip.write_register(0xc0, 0x00);
        key_on(&mut chip, 0);
        let (voices, _) = render_voices(&mut chip, 300);
        assert!(!is_silent(&voices[0]));
        for frame in voices[0].chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_waveform_limited_outside_opl3_mode() {
        let mut chip = native_chip(ChipType::Opl3);
        chip.write_register(0xe0, 0x06);
        let slot = chip.channel(0).unwrap().slot(0).unwrap();
        assert_eq!(slot.waveform(), 6);
        assert_eq!(slot.wavetable, 2 * SIN_LEN);

        chip.write_register(0x105, 1);
        chip.write_register(0xe0, 0x06);
        let slot = chip.channel(0).unwrap().slot(0).unwrap();
        assert_eq!(slot.wavetable, 6 * SIN_LEN);
    }

    #[test]
    fn test_test_register_ignored() {
        let mut chip = native_chip(ChipType::Opl3);
        // 0x01 is a test register on the OPL3, not waveform enable
        chip.write_register(0x01, 0x20);
        chip.write_register(0x101, 0xff);
        chip.write_register(0xe0, 0x01);
        assert_eq!(chip.channel(0).unwrap().slot(0).unwrap().waveform(), 1);
    }

    #[test]
    fn test_opl2_waveform_needs_enable() {
        let mut chip = native_chip(ChipType::Opl2);
        chip.write_register(0xe3, 0x02);
        assert_eq!(chip.channel(0).unwrap().slot(1).unwrap().waveform(), 0);
        chip.write_register(0x01, 0x20);
        chip.write_register(0xe3, 0x06);
        let slot = chip.channel(0).unwrap().slot(1).unwrap();
        assert_eq!(slot.waveform(), 2);
        assert_eq!(slot.wavetable, 2 * SIN_LEN);
    }

    #[test]
    fn test_opl2_ignores_second_bank() {
        let mut chip = native_chip(ChipType::Opl2);
        chip.write_register(0x105, 0x01);
        assert!(!chip.opl3_mode());
        // decoded as 0xa0
        chip.write_register(0x1a0, 0x42);
        assert_eq!(chip.channel(0).unwrap().block_fnum().fnum(), 0x42);
    }
}
